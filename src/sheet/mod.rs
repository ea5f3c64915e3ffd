//! Fluent Google Sheet loader.
//!
//! Reads a rectangular range, treats row 0 as the header, and hands the
//! resulting records to an attached [`Bq`] builder for the actual load. The
//! destination table must not exist yet; this builder never overwrites.

use crate::bq::Bq;
use crate::error::{FluentError, Result};
use crate::schema::Field;
use crate::service::{Row, SheetService};
use crate::validate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// Sanity threshold for sheet ids; real ids are longer, short strings are
/// almost certainly a worksheet name passed in the wrong slot.
const MIN_SHEET_ID_LEN: usize = 40;

static SHEET_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("sheet url regex"));

pub struct Sheet {
    service: Arc<dyn SheetService>,
    sheet_id: Option<String>,
    worksheet: Option<String>,
    range: Option<String>,
    schema: Option<Vec<Field>>,
    bq: Option<Bq>,
}

impl Sheet {
    pub fn new(service: Arc<dyn SheetService>) -> Self {
        Self {
            service,
            sheet_id: None,
            worksheet: None,
            range: None,
            schema: None,
            bq: None,
        }
    }

    /// The spreadsheet UID. Length is checked as a format sanity test only,
    /// not for existence.
    pub fn sheet_id(mut self, sheet_id: impl Into<String>) -> Result<Self> {
        let sheet_id = sheet_id.into();
        if sheet_id.len() < MIN_SHEET_ID_LEN {
            return Err(FluentError::Validation(format!(
                "`{sheet_id}` is too short to be a sheet id (expected at least {MIN_SHEET_ID_LEN} chars)"
            )));
        }
        self.sheet_id = Some(sheet_id);
        Ok(self)
    }

    /// Extract the sheet id from a `https://docs.google.com/spreadsheets/d/...`
    /// URL.
    pub fn url(self, url: &str) -> Result<Self> {
        let captured = SHEET_URL
            .captures(url)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                FluentError::Validation(format!("`{url}` does not look like a spreadsheet URL"))
            })?;
        self.sheet_id(captured.as_str())
    }

    /// Worksheet tab name, optionally with an embedded `name!range`.
    pub fn worksheet(mut self, worksheet: impl Into<String>) -> Result<Self> {
        if self.sheet_id.is_none() {
            return Err(FluentError::Validation(
                ".sheet_id() must be called before .worksheet()".to_string(),
            ));
        }
        self.worksheet = Some(worksheet.into());
        Ok(self)
    }

    /// Cell range such as `A1:B100`; mutually exclusive with a range embedded
    /// in the worksheet name.
    pub fn range(mut self, range: impl Into<String>) -> Result<Self> {
        let worksheet = self.worksheet.as_deref().ok_or_else(|| {
            FluentError::Validation(".worksheet() must be called before .range()".to_string())
        })?;
        if worksheet.contains('!') {
            return Err(FluentError::Validation(format!(
                "worksheet `{worksheet}` already embeds a range"
            )));
        }
        self.range = Some(range.into());
        Ok(self)
    }

    /// Explicit destination schema; propagated into the attached [`Bq`] so
    /// the load uses it instead of autodetect.
    pub fn schema(mut self, fields: Vec<Field>) -> Self {
        if let Some(bq) = self.bq.as_mut() {
            bq.set_schema(fields.clone());
        }
        self.schema = Some(fields);
        self
    }

    /// Attach the BigQuery builder that performs the final load.
    pub fn bq(mut self, mut bq: Bq) -> Self {
        if let Some(fields) = &self.schema {
            bq.set_schema(fields.clone());
        }
        self.bq = Some(bq);
        self
    }

    /// String-keyed setter dispatch; unknown keys are logged and ignored.
    pub fn apply(self, key: &str, value: &str) -> Result<Self> {
        match key {
            "sheet_id" => self.sheet_id(value),
            "url" => self.url(value),
            "worksheet" => self.worksheet(value),
            "range" => self.range(value),
            other => {
                warn!("ignored setting `{other}`");
                Ok(self)
            }
        }
    }

    fn resolved_range(&self) -> Option<String> {
        let worksheet = self.worksheet.as_deref()?;
        if worksheet.contains('!') {
            return Some(worksheet.to_string());
        }
        Some(match self.range.as_deref() {
            Some(range) => format!("{worksheet}!{range}"),
            None => worksheet.to_string(),
        })
    }

    /// Fetch the range and load it into the attached builder's destination
    /// table. Fails with a conflict if that table already exists.
    pub async fn load(&self, location: &str) -> Result<()> {
        let (worksheet, bq) = self.worksheet.as_deref().zip(self.bq.as_ref()).ok_or_else(|| {
            FluentError::Validation(".worksheet() and .bq() must be called before run".to_string())
        })?;
        let dest = bq.destination().ok_or_else(|| {
            FluentError::Validation("bigquery table must be specified for the load".to_string())
        })?;
        let sheet_id = self.sheet_id.as_deref().ok_or_else(|| {
            FluentError::Validation(".sheet_id() must be called before run".to_string())
        })?;

        let range = self.resolved_range().unwrap_or_else(|| worksheet.to_string());
        let values = self.service.get_values(sheet_id, &range).await?;
        let rows = self.build_records(&values)?;

        if bq.exists().await? {
            return Err(FluentError::Conflict(format!(
                "table {dest} already exists, refusing to overwrite"
            )));
        }

        bq.submit_records(&rows, location).await?;
        info!("{sheet_id} is loaded into {dest}");
        Ok(())
    }

    /// Row 0 is the header. Without an explicit schema the header names
    /// become record keys and must be legal column names; with one, the
    /// schema's field names are used and cell values are trimmed.
    fn build_records(&self, values: &[Vec<String>]) -> Result<Vec<Row>> {
        let header = values
            .first()
            .ok_or_else(|| FluentError::Validation("empty sheet, aborted".to_string()))?;
        if header.is_empty() {
            return Err(FluentError::Validation(
                "empty sheet column name row, aborted".to_string(),
            ));
        }

        match &self.schema {
            None => {
                if let Some(bad) = header.iter().find(|h| !validate::is_column_name(h)) {
                    return Err(FluentError::Validation(format!(
                        "field name `{bad}` is illegal; fields must contain only letters, \
                         numbers, and underscores, and start with a letter or underscore"
                    )));
                }
                Ok(values[1..]
                    .iter()
                    .map(|cells| {
                        header
                            .iter()
                            .zip(cells)
                            .map(|(name, cell)| {
                                (name.clone(), serde_json::Value::String(cell.clone()))
                            })
                            .collect()
                    })
                    .collect())
            }
            Some(fields) => {
                if header.len() != fields.len() {
                    return Err(FluentError::Validation(format!(
                        "header has {} columns but the schema has {} fields",
                        header.len(),
                        fields.len()
                    )));
                }
                Ok(values[1..]
                    .iter()
                    .map(|cells| {
                        fields
                            .iter()
                            .zip(cells)
                            .map(|(field, cell)| {
                                (
                                    field.name.clone(),
                                    serde_json::Value::String(cell.trim().to_string()),
                                )
                            })
                            .collect()
                    })
                    .collect())
            }
        }
    }
}

impl std::fmt::Debug for Sheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sheet")
            .field("sheet_id", &self.sheet_id)
            .field("worksheet", &self.worksheet)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BqType;
    use crate::service::{BqCall, MockBqService, MockSheetService};

    const SHEET_ID: &str = "1TpviErgA8xiyCaY0iOIN1XfK0QIm4vcTulmtowaC7NM";
    const PROJECT: &str = "some-project-id";

    fn sheet(service: Arc<MockSheetService>) -> Sheet {
        Sheet::new(service)
    }

    fn attached_bq(service: Arc<MockBqService>) -> Bq {
        Bq::new(PROJECT, service)
            .unwrap()
            .table("dataset.table")
            .unwrap()
    }

    #[test]
    fn test_sheet_id_rejects_short_ids() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .sheet_id("not-a-valid-sheet")
            .unwrap_err();
        assert!(err.to_string().contains("not-a-valid-sheet"));

        let s = sheet(Arc::new(MockSheetService::new()))
            .sheet_id(SHEET_ID)
            .unwrap();
        assert_eq!(s.sheet_id.as_deref(), Some(SHEET_ID));
    }

    #[test]
    fn test_url_extracts_sheet_id() {
        let url = format!("https://docs.google.com/spreadsheets/d/{SHEET_ID}/edit#gid=1970528798");
        let s = sheet(Arc::new(MockSheetService::new())).url(&url).unwrap();
        assert_eq!(s.sheet_id.as_deref(), Some(SHEET_ID));
    }

    #[test]
    fn test_url_rejects_non_spreadsheet_urls() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .url("https://docs.google.com/document/d/abc/edit")
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[test]
    fn test_worksheet_requires_sheet_id() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .worksheet("sheet_name!A1:B100")
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[test]
    fn test_range_requires_worksheet() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .range("A1:B100")
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[test]
    fn test_range_rejected_when_worksheet_embeds_one() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name!A1:B100")
            .unwrap()
            .range("A1:B100")
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[test]
    fn test_resolved_range_combines_worksheet_and_range() {
        let s = sheet(Arc::new(MockSheetService::new()))
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .range("A1:B100")
            .unwrap();
        assert_eq!(s.resolved_range().unwrap(), "sheet_name!A1:B100");
    }

    #[test]
    fn test_schema_propagates_in_both_attach_orders() {
        let fields = vec![Field::new("name", BqType::String)];

        let s = sheet(Arc::new(MockSheetService::new()))
            .schema(fields.clone())
            .bq(attached_bq(Arc::new(MockBqService::new())));
        assert!(s.bq.as_ref().unwrap().has_schema());

        let s = sheet(Arc::new(MockSheetService::new()))
            .bq(attached_bq(Arc::new(MockBqService::new())))
            .schema(fields);
        assert!(s.bq.as_ref().unwrap().has_schema());
    }

    #[tokio::test]
    async fn test_load_requires_worksheet_and_bq() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .load("US")
            .await
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_load_requires_destination_table() {
        let bq = Bq::new(PROJECT, Arc::new(MockBqService::new())).unwrap();
        let err = sheet(Arc::new(MockSheetService::new()))
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .bq(bq)
            .load("US")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("table must be specified"));
    }

    #[tokio::test]
    async fn test_load_zips_headers_into_records() {
        let sheet_service = Arc::new(MockSheetService::new().with_values(vec![
            vec!["name", "age"],
            vec!["alice", "31"],
            vec!["bob", "42"],
        ]));
        let bq_service = Arc::new(MockBqService::new());

        sheet(sheet_service.clone())
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .range("A1:B100")
            .unwrap()
            .bq(attached_bq(bq_service.clone()))
            .load("US")
            .await
            .unwrap();

        let requests = sheet_service.requests();
        assert_eq!(requests[0].sheet_id, SHEET_ID);
        assert_eq!(requests[0].range, "sheet_name!A1:B100");

        let load = bq_service
            .calls()
            .into_iter()
            .find_map(|c| match c {
                BqCall::LoadFromJson {
                    rows,
                    dest,
                    autodetect,
                    location,
                    ..
                } => Some((rows, dest, autodetect, location)),
                _ => None,
            })
            .expect("load call");
        assert_eq!(load.1, format!("{PROJECT}.dataset.table"));
        assert!(load.2, "no explicit schema means autodetect");
        assert_eq!(load.3, "US");
        assert_eq!(load.0.len(), 2);
        assert_eq!(load.0[0]["name"], "alice");
        assert_eq!(load.0[1]["age"], "42");
    }

    #[tokio::test]
    async fn test_load_short_rows_truncate_the_zip() {
        let sheet_service = Arc::new(
            MockSheetService::new().with_values(vec![vec!["name", "age"], vec!["alice"]]),
        );
        let bq_service = Arc::new(MockBqService::new());

        sheet(sheet_service)
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .bq(attached_bq(bq_service.clone()))
            .load("US")
            .await
            .unwrap();

        let rows = bq_service
            .calls()
            .into_iter()
            .find_map(|c| match c {
                BqCall::LoadFromJson { rows, .. } => Some(rows),
                _ => None,
            })
            .unwrap();
        assert_eq!(rows[0].len(), 1);
        assert!(!rows[0].contains_key("age"));
    }

    #[tokio::test]
    async fn test_load_rejects_empty_sheet() {
        let err = sheet(Arc::new(MockSheetService::new()))
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .bq(attached_bq(Arc::new(MockBqService::new())))
            .load("US")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty sheet"));
    }

    #[tokio::test]
    async fn test_load_names_first_illegal_header() {
        let sheet_service = Arc::new(MockSheetService::new().with_values(vec![
            vec!["name", "1bad", "2worse"],
            vec!["a", "b", "c"],
        ]));
        let err = sheet(sheet_service)
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .bq(attached_bq(Arc::new(MockBqService::new())))
            .load("US")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("`1bad`"));
    }

    #[tokio::test]
    async fn test_load_with_schema_uses_field_names_and_trims() {
        let sheet_service = Arc::new(MockSheetService::new().with_values(vec![
            vec!["Display Name", "Their Age"],
            vec![" alice ", " 31"],
        ]));
        let bq_service = Arc::new(MockBqService::new());
        let bq = attached_bq(bq_service.clone());

        sheet(sheet_service)
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .schema(vec![
                Field::new("name", BqType::String),
                Field::new("age", BqType::Integer),
            ])
            .bq(bq)
            .load("US")
            .await
            .unwrap();

        let (rows, autodetect) = bq_service
            .calls()
            .into_iter()
            .find_map(|c| match c {
                BqCall::LoadFromJson {
                    rows, autodetect, ..
                } => Some((rows, autodetect)),
                _ => None,
            })
            .unwrap();
        assert!(!autodetect);
        assert_eq!(rows[0]["name"], "alice");
        assert_eq!(rows[0]["age"], "31");
    }

    #[tokio::test]
    async fn test_load_with_schema_checks_column_count() {
        let sheet_service = Arc::new(MockSheetService::new().with_values(vec![
            vec!["name", "age", "extra"],
            vec!["a", "1", "x"],
        ]));
        let err = sheet(sheet_service)
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .schema(vec![
                Field::new("name", BqType::String),
                Field::new("age", BqType::Integer),
            ])
            .bq(attached_bq(Arc::new(MockBqService::new())))
            .load("US")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("3 columns"));
    }

    #[tokio::test]
    async fn test_load_conflicts_on_existing_destination() {
        let sheet_service = Arc::new(
            MockSheetService::new().with_values(vec![vec!["name"], vec!["alice"]]),
        );
        let bq_service = Arc::new(
            MockBqService::new().with_table(&format!("{PROJECT}.dataset.table"), 10),
        );

        let err = sheet(sheet_service)
            .sheet_id(SHEET_ID)
            .unwrap()
            .worksheet("sheet_name")
            .unwrap()
            .bq(attached_bq(bq_service.clone()))
            .load("US")
            .await
            .unwrap_err();

        assert!(matches!(err, FluentError::Conflict(_)));
        let loaded = bq_service
            .calls()
            .iter()
            .any(|c| matches!(c, BqCall::LoadFromJson { .. }));
        assert!(!loaded, "conflict must prevent the load");
    }
}
