//! Fluent BigQuery builder.
//!
//! Accumulates query/load configuration through chained setters, then a
//! single action call picks the service operation. The presence of a
//! destination table is what switches `query()` between returning rows and
//! materializing into the table.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bqfluent::{Bq, MockBqService, WriteMode};
//! # async fn run() -> bqfluent::Result<()> {
//! let service = Arc::new(MockBqService::new());
//! let loaded = Bq::new("my-project", service)?
//!     .table("staging.events")?
//!     .mode(WriteMode::Truncate)
//!     .sql("SELECT * FROM raw.events")?
//!     .query()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{FluentError, Result};
use crate::schema::Field;
use crate::service::{BqService, Row, SchemaSpec, TableId};
use crate::validate::{self, CreateMode, SourceFormat, WriteMode};
use std::sync::Arc;
use tracing::{info, warn};

/// What `query()` produced: plain rows when no destination table is
/// configured, otherwise the job's total row count.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Loaded(u64),
}

impl QueryOutput {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Loaded(_) => None,
        }
    }

    pub fn loaded(&self) -> Option<u64> {
        match self {
            QueryOutput::Rows(_) => None,
            QueryOutput::Loaded(n) => Some(*n),
        }
    }
}

pub struct Bq {
    project: String,
    service: Arc<dyn BqService>,
    table: Option<TableId>,
    gcs: Option<String>,
    sql: Option<String>,
    schema: Option<Vec<Field>>,
    mode: WriteMode,
    create_mode: CreateMode,
    format: SourceFormat,
}

impl Bq {
    pub fn new(project: impl Into<String>, service: Arc<dyn BqService>) -> Result<Self> {
        let project = project.into();
        if project.is_empty() {
            return Err(FluentError::Validation(
                "project id must be provided".to_string(),
            ));
        }
        Ok(Self {
            project,
            service,
            table: None,
            gcs: None,
            sql: None,
            schema: None,
            mode: WriteMode::default(),
            create_mode: CreateMode::default(),
            format: SourceFormat::default(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Destination table as `dataset.table`; the stored project id is
    /// prefixed to form the fully-qualified id.
    pub fn table(mut self, table: &str) -> Result<Self> {
        validate::qualified_table(table)?;
        self.table = Some(TableId::parse(&self.project, table)?);
        Ok(self)
    }

    /// Source location for `load()`, a single object or a wildcard.
    pub fn gcs(mut self, uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        validate::gcs_uri(&uri)?;
        self.gcs = Some(uri);
        Ok(self)
    }

    /// One read statement. Anything that does not start with SELECT or WITH
    /// is rejected here, before any service call.
    pub fn sql(mut self, sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        validate::read_query(&sql)?;
        self.sql = Some(sql);
        Ok(self)
    }

    pub fn schema(mut self, fields: Vec<Field>) -> Self {
        self.schema = Some(fields);
        self
    }

    /// Write disposition, default `WRITE_APPEND`.
    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode_str(self, mode: &str) -> Result<Self> {
        Ok(self.mode(mode.parse()?))
    }

    /// Create disposition, default `CREATE_IF_NEEDED`.
    pub fn create_mode(mut self, create_mode: CreateMode) -> Self {
        self.create_mode = create_mode;
        self
    }

    pub fn create_mode_str(self, create_mode: &str) -> Result<Self> {
        Ok(self.create_mode(create_mode.parse()?))
    }

    /// Source file format, default `NEWLINE_DELIMITED_JSON`.
    pub fn format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format_str(self, format: &str) -> Result<Self> {
        Ok(self.format(format.parse()?))
    }

    /// String-keyed setter dispatch for the settable attributes. Unknown
    /// keys are logged and ignored.
    pub fn apply(self, key: &str, value: &str) -> Result<Self> {
        match key {
            "table" => self.table(value),
            "gcs" => self.gcs(value),
            "sql" => self.sql(value),
            "mode" => self.mode_str(value),
            "create_mode" => self.create_mode_str(value),
            "format" => self.format_str(value),
            other => {
                warn!("ignored setting `{other}`");
                Ok(self)
            }
        }
    }

    fn require_table(&self) -> Result<&TableId> {
        self.table
            .as_ref()
            .ok_or_else(|| FluentError::Validation("you must specify the table".to_string()))
    }

    fn require_sql(&self) -> Result<&str> {
        self.sql
            .as_deref()
            .ok_or_else(|| FluentError::Validation(".sql() must be called before run".to_string()))
    }

    fn schema_spec(&self) -> SchemaSpec {
        match &self.schema {
            Some(fields) => SchemaSpec::Explicit(fields.clone()),
            None => SchemaSpec::Autodetect,
        }
    }

    /// Run the configured statement. With a destination table set the result
    /// is written there under the configured dispositions and the job's row
    /// count comes back; without one the rows come back directly.
    pub async fn query(&self) -> Result<QueryOutput> {
        let sql = self.require_sql()?;
        match &self.table {
            Some(dest) => {
                let total = self
                    .service
                    .query_to_table(sql, dest, self.mode, self.create_mode)
                    .await?;
                Ok(QueryOutput::Loaded(total))
            }
            None => Ok(QueryOutput::Rows(self.service.query_rows(sql).await?)),
        }
    }

    /// Run a load job from the configured GCS location and return the
    /// destination table's row count afterwards. Note this is the table
    /// total, not the delta: with `WRITE_APPEND` the caller compares against
    /// the prior count if it wants the number of new rows.
    pub async fn load(&self, location: &str) -> Result<u64> {
        let dest = self.table.as_ref().zip(self.gcs.as_deref()).ok_or_else(|| {
            FluentError::Validation(".table() and .gcs() must be called before run".to_string())
        })?;
        let (dest, uri) = dest;

        self.service
            .load_from_uri(
                uri,
                dest,
                &self.schema_spec(),
                self.format,
                self.mode,
                self.create_mode,
                location,
            )
            .await?;

        self.service.table_num_rows(dest).await
    }

    /// Delete all rows in the configured table. Idempotent.
    pub async fn truncate(&self) -> Result<()> {
        let dest = self.require_table()?;
        let sql = format!("TRUNCATE TABLE {dest}");
        info!("truncate is called, sql = {sql}");
        self.service.query_rows(&sql).await?;
        Ok(())
    }

    /// Drop the configured table. A missing table is not an error.
    pub async fn delete(&self) -> Result<()> {
        let dest = self.require_table()?;
        warn!("deleting the table {dest}");
        self.service.delete_table(dest, true).await
    }

    /// Alias of [`Bq::delete`].
    pub async fn drop_table(&self) -> Result<()> {
        self.delete().await
    }

    /// Whether the configured table exists; a not-found answer from the
    /// service becomes `false` instead of an error.
    pub async fn exists(&self) -> Result<bool> {
        let dest = self.require_table()?;
        match self.service.table_num_rows(dest).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                warn!("table {dest} not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_dataset(&self, dataset: &str, location: &str, timeout_secs: u64) -> Result<()> {
        self.service
            .create_dataset(&self.project, dataset, location, timeout_secs)
            .await?;
        info!("created dataset {}.{dataset}", self.project);
        Ok(())
    }

    /// Drops the dataset with its contents; tolerant of it being absent.
    pub async fn delete_dataset(&self, dataset: &str) -> Result<()> {
        self.service.delete_dataset(&self.project, dataset).await?;
        info!("deleted dataset {}.{dataset}", self.project);
        Ok(())
    }

    // Narrow surface for composing builders (the Sheet loader), instead of
    // letting them reach into configuration fields.

    pub fn destination(&self) -> Option<&TableId> {
        self.table.as_ref()
    }

    pub fn source_format(&self) -> SourceFormat {
        self.format
    }

    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    pub fn schema_fields(&self) -> Option<&[Field]> {
        self.schema.as_deref()
    }

    pub fn set_schema(&mut self, fields: Vec<Field>) {
        self.schema = Some(fields);
    }

    /// Load in-memory records into the configured destination, with the
    /// explicit schema when one is set and autodetect otherwise.
    pub async fn submit_records(&self, rows: &[Row], location: &str) -> Result<()> {
        let dest = self.require_table()?;
        self.service
            .load_from_json(rows, dest, &self.schema_spec(), self.format, location)
            .await
    }
}

impl std::fmt::Debug for Bq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bq").field("project", &self.project).finish()
    }
}
