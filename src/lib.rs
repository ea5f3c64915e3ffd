//! Fluent builders for moving data around Google Cloud: run or materialize
//! BigQuery queries, load GCS objects into tables, transfer local files to
//! and from buckets, and load spreadsheet ranges into tables.
//!
//! Each builder chains validated setters over a long-lived handle and ends
//! in one action call; which underlying operation runs is decided by which
//! configuration is present. All cloud traffic goes through the narrow
//! [`service`] traits, so everything is testable against the bundled mocks
//! and the real backends live behind the `gcp` feature.

pub mod bq;
pub mod error;
pub mod gcs;
pub mod schema;
pub mod service;
pub mod sheet;
pub mod validate;

pub use bq::{Bq, QueryOutput};
pub use error::{FluentError, Result};
pub use gcs::Gcs;
pub use schema::{BqType, Field, FieldMode};
pub use service::{
    BqCall, BqService, GcsCall, GcsService, MockBqService, MockGcsService, MockSheetService, Row,
    SchemaSpec, SheetRequest, SheetService, TableId,
};
pub use sheet::Sheet;
pub use validate::{CreateMode, SourceFormat, WriteMode};

#[cfg(feature = "gcp")]
pub use service::gcp::{BigQueryBackend, GcsBackend, SheetsHttp};
