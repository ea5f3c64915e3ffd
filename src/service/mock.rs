//! In-memory service doubles.
//!
//! Public so downstream users can exercise builder pipelines without a GCP
//! project. Each mock records every call it receives and serves canned
//! responses seeded through its fields.

use super::{BqService, GcsService, Row, SchemaSpec, SheetService, TableId};
use crate::error::{FluentError, Result};
use crate::validate::{CreateMode, SourceFormat, WriteMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum BqCall {
    QueryRows {
        sql: String,
    },
    QueryToTable {
        sql: String,
        dest: String,
        write: WriteMode,
        create: CreateMode,
    },
    LoadFromUri {
        uri: String,
        dest: String,
        autodetect: bool,
        format: SourceFormat,
        write: WriteMode,
        create: CreateMode,
        location: String,
    },
    LoadFromJson {
        rows: Vec<Row>,
        dest: String,
        autodetect: bool,
        format: SourceFormat,
        location: String,
    },
    TableNumRows {
        dest: String,
    },
    DeleteTable {
        dest: String,
        not_found_ok: bool,
    },
    CreateDataset {
        dataset: String,
        location: String,
        timeout_secs: u64,
    },
    DeleteDataset {
        dataset: String,
    },
}

#[derive(Default)]
pub struct MockBqService {
    /// Response for `query_rows`.
    pub rows: Mutex<Vec<Row>>,
    /// Response for `query_to_table`.
    pub query_total_rows: Mutex<u64>,
    /// Existing tables keyed by `project.dataset.table`, value is `num_rows`.
    pub tables: Mutex<HashMap<String, u64>>,
    pub calls: Mutex<Vec<BqCall>>,
}

impl MockBqService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    pub fn with_query_total_rows(self, n: u64) -> Self {
        *self.query_total_rows.lock().unwrap() = n;
        self
    }

    pub fn with_table(self, qualified: &str, num_rows: u64) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(qualified.to_string(), num_rows);
        self
    }

    pub fn calls(&self) -> Vec<BqCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BqCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BqService for MockBqService {
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        self.record(BqCall::QueryRows {
            sql: sql.to_string(),
        });
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn query_to_table(
        &self,
        sql: &str,
        dest: &TableId,
        write: WriteMode,
        create: CreateMode,
    ) -> Result<u64> {
        self.record(BqCall::QueryToTable {
            sql: sql.to_string(),
            dest: dest.to_string(),
            write,
            create,
        });
        Ok(*self.query_total_rows.lock().unwrap())
    }

    async fn load_from_uri(
        &self,
        uri: &str,
        dest: &TableId,
        schema: &SchemaSpec,
        format: SourceFormat,
        write: WriteMode,
        create: CreateMode,
        location: &str,
    ) -> Result<()> {
        self.record(BqCall::LoadFromUri {
            uri: uri.to_string(),
            dest: dest.to_string(),
            autodetect: schema.is_autodetect(),
            format,
            write,
            create,
            location: location.to_string(),
        });
        Ok(())
    }

    async fn load_from_json(
        &self,
        rows: &[Row],
        dest: &TableId,
        schema: &SchemaSpec,
        format: SourceFormat,
        location: &str,
    ) -> Result<()> {
        self.record(BqCall::LoadFromJson {
            rows: rows.to_vec(),
            dest: dest.to_string(),
            autodetect: schema.is_autodetect(),
            format,
            location: location.to_string(),
        });
        Ok(())
    }

    async fn table_num_rows(&self, dest: &TableId) -> Result<u64> {
        self.record(BqCall::TableNumRows {
            dest: dest.to_string(),
        });
        self.tables
            .lock()
            .unwrap()
            .get(&dest.to_string())
            .copied()
            .ok_or_else(|| FluentError::NotFound(format!("table {dest} not found")))
    }

    async fn delete_table(&self, dest: &TableId, not_found_ok: bool) -> Result<()> {
        self.record(BqCall::DeleteTable {
            dest: dest.to_string(),
            not_found_ok,
        });
        let removed = self.tables.lock().unwrap().remove(&dest.to_string());
        if removed.is_none() && !not_found_ok {
            return Err(FluentError::NotFound(format!("table {dest} not found")));
        }
        Ok(())
    }

    async fn create_dataset(
        &self,
        project: &str,
        dataset: &str,
        location: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        self.record(BqCall::CreateDataset {
            dataset: format!("{project}.{dataset}"),
            location: location.to_string(),
            timeout_secs,
        });
        Ok(())
    }

    async fn delete_dataset(&self, project: &str, dataset: &str) -> Result<()> {
        self.record(BqCall::DeleteDataset {
            dataset: format!("{project}.{dataset}"),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GcsCall {
    Upload {
        bucket: String,
        object: String,
        local: PathBuf,
    },
    List {
        bucket: String,
        prefix: String,
        delimiter: Option<String>,
    },
    Download {
        bucket: String,
        object: String,
        local: PathBuf,
    },
    DeleteBatch {
        bucket: String,
        objects: Vec<String>,
    },
}

#[derive(Default)]
pub struct MockGcsService {
    /// Object names served by `list_objects` (filtered by prefix).
    pub objects: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<GcsCall>>,
}

impl MockGcsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(self, names: &[&str]) -> Self {
        *self.objects.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<GcsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: GcsCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GcsService for MockGcsService {
    async fn upload_file(&self, bucket: &str, object: &str, local: &Path) -> Result<()> {
        self.record(GcsCall::Upload {
            bucket: bucket.to_string(),
            object: object.to_string(),
            local: local.to_path_buf(),
        });
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<String>> {
        self.record(GcsCall::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            delimiter: delimiter.map(|d| d.to_string()),
        });
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download_object(&self, bucket: &str, object: &str, local: &Path) -> Result<()> {
        self.record(GcsCall::Download {
            bucket: bucket.to_string(),
            object: object.to_string(),
            local: local.to_path_buf(),
        });
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, objects: &[String]) -> Result<()> {
        self.record(GcsCall::DeleteBatch {
            bucket: bucket.to_string(),
            objects: objects.to_vec(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRequest {
    pub sheet_id: String,
    pub range: String,
}

#[derive(Default)]
pub struct MockSheetService {
    /// Cell grid served by `get_values`.
    pub values: Mutex<Vec<Vec<String>>>,
    pub requests: Mutex<Vec<SheetRequest>>,
}

impl MockSheetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(self, values: Vec<Vec<&str>>) -> Self {
        *self.values.lock().unwrap() = values
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.to_string()).collect())
            .collect();
        self
    }

    pub fn requests(&self) -> Vec<SheetRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetService for MockSheetService {
    async fn get_values(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        self.requests.lock().unwrap().push(SheetRequest {
            sheet_id: sheet_id.to_string(),
            range: range.to_string(),
        });
        Ok(self.values.lock().unwrap().clone())
    }
}
