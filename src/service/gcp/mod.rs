//! Real Google Cloud implementations of the service traits.
//!
//! Enabled with the `gcp` cargo feature. Credential discovery stays with the
//! caller: the BigQuery backend takes a service-account key file, the storage
//! backend reads the standard environment, and the Sheets backend takes a
//! ready access token.

mod bigquery;
mod sheets;
mod storage;

pub use bigquery::BigQueryBackend;
pub use sheets::SheetsHttp;
pub use storage::GcsBackend;
