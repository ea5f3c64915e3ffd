//! The narrow capability surface the builders consume.
//!
//! The builders never talk to a vendor SDK directly; they go through these
//! traits. The in-memory mocks back the unit tests, and the `gcp` feature
//! provides real implementations over the Google Cloud crates.

mod mock;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use mock::{BqCall, GcsCall, MockBqService, MockGcsService, MockSheetService, SheetRequest};

use crate::error::{FluentError, Result};
use crate::schema::Field;
use crate::validate::{CreateMode, SourceFormat, WriteMode};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// One result/record row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Fully-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    /// Splits a `dataset.table` name under the given project. The caller is
    /// expected to have run [`crate::validate::qualified_table`] first, but
    /// the split re-checks the shape so a `TableId` is always three parts.
    pub fn parse(project: &str, qualified: &str) -> Result<Self> {
        let (dataset, table) = qualified.split_once('.').ok_or_else(|| {
            FluentError::Validation(format!("`{qualified}` does not look like dataset.table"))
        })?;
        if dataset.is_empty() || table.is_empty() {
            return Err(FluentError::Validation(format!(
                "`{qualified}` does not look like dataset.table"
            )));
        }
        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Explicit presence marker for the schema configuration: a load either
/// carries the caller's field list or asks the service to autodetect.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSpec {
    Autodetect,
    Explicit(Vec<Field>),
}

impl SchemaSpec {
    pub fn is_autodetect(&self) -> bool {
        matches!(self, SchemaSpec::Autodetect)
    }
}

/// Warehouse operations, modeled after the BigQuery job/table/dataset APIs.
#[async_trait]
pub trait BqService: Send + Sync {
    /// Execute a read query and return its rows.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>>;

    /// Execute a query with a destination table and return the job's total
    /// row count.
    async fn query_to_table(
        &self,
        sql: &str,
        dest: &TableId,
        write: WriteMode,
        create: CreateMode,
    ) -> Result<u64>;

    /// Run a load job from an object-store URI and wait for completion.
    #[allow(clippy::too_many_arguments)]
    async fn load_from_uri(
        &self,
        uri: &str,
        dest: &TableId,
        schema: &SchemaSpec,
        format: SourceFormat,
        write: WriteMode,
        create: CreateMode,
        location: &str,
    ) -> Result<()>;

    /// Load in-memory records and wait for completion.
    async fn load_from_json(
        &self,
        rows: &[Row],
        dest: &TableId,
        schema: &SchemaSpec,
        format: SourceFormat,
        location: &str,
    ) -> Result<()>;

    /// One metadata fetch; `FluentError::NotFound` when the table is absent.
    async fn table_num_rows(&self, dest: &TableId) -> Result<u64>;

    async fn delete_table(&self, dest: &TableId, not_found_ok: bool) -> Result<()>;

    async fn create_dataset(
        &self,
        project: &str,
        dataset: &str,
        location: &str,
        timeout_secs: u64,
    ) -> Result<()>;

    /// Deletes contents too; tolerant of a missing dataset.
    async fn delete_dataset(&self, project: &str, dataset: &str) -> Result<()>;
}

/// Object-store operations over buckets and named objects.
#[async_trait]
pub trait GcsService: Send + Sync {
    async fn upload_file(&self, bucket: &str, object: &str, local: &Path) -> Result<()>;

    /// List object names under `prefix`. With a delimiter the listing is
    /// shallow and directory-like entries keep their trailing delimiter.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<String>>;

    async fn download_object(&self, bucket: &str, object: &str, local: &Path) -> Result<()>;

    /// Delete all named objects in one batched call.
    async fn delete_objects(&self, bucket: &str, objects: &[String]) -> Result<()>;
}

/// Spreadsheet read access: one rectangular range of cell values.
#[async_trait]
pub trait SheetService: Send + Sync {
    async fn get_values(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;
}
