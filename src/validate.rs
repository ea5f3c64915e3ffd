//! Validation primitives shared by the fluent builders.
//!
//! Every setter validates through one of these before storing anything, so an
//! Action Call never has to re-check a value it reads back out of the
//! configuration.

use crate::error::{FluentError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const GCS_SCHEME: &str = "gs://";

static COLUMN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("column name regex"));

/// `dataset.table` shape check. The project id is prefixed later.
pub fn qualified_table(table: &str) -> Result<()> {
    if !table.contains('.') {
        return Err(FluentError::Validation(format!(
            "`{table}` does not look like dataset.table"
        )));
    }
    Ok(())
}

pub fn gcs_uri(uri: &str) -> Result<()> {
    if !uri.starts_with(GCS_SCHEME) {
        return Err(FluentError::Validation(format!(
            "`{uri}` does not look like {GCS_SCHEME}bucket/path"
        )));
    }
    Ok(())
}

/// Only read queries are accepted; every other statement shape is rejected
/// outright rather than passed through to the service.
pub fn read_query(sql: &str) -> Result<()> {
    let upper = sql.trim_start().to_uppercase();
    if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
        return Err(FluentError::Validation(format!(
            "`{sql}` does not look like SELECT or WITH ..."
        )));
    }
    Ok(())
}

/// Legal BigQuery column name: letters, digits and underscores, not starting
/// with a digit.
pub fn is_column_name(name: &str) -> bool {
    COLUMN_NAME.is_match(name)
}

/// BigQuery `write_disposition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    Empty,
    Truncate,
    #[default]
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Empty => "WRITE_EMPTY",
            WriteMode::Truncate => "WRITE_TRUNCATE",
            WriteMode::Append => "WRITE_APPEND",
        }
    }
}

impl FromStr for WriteMode {
    type Err = FluentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WRITE_EMPTY" => Ok(WriteMode::Empty),
            "WRITE_TRUNCATE" => Ok(WriteMode::Truncate),
            "WRITE_APPEND" => Ok(WriteMode::Append),
            other => Err(FluentError::Validation(format!(
                "`{other}` is not one of WRITE_EMPTY|WRITE_TRUNCATE|WRITE_APPEND"
            ))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BigQuery `create_disposition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    Never,
    #[default]
    IfNeeded,
}

impl CreateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreateMode::Never => "CREATE_NEVER",
            CreateMode::IfNeeded => "CREATE_IF_NEEDED",
        }
    }
}

impl FromStr for CreateMode {
    type Err = FluentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE_NEVER" => Ok(CreateMode::Never),
            "CREATE_IF_NEEDED" => Ok(CreateMode::IfNeeded),
            other => Err(FluentError::Validation(format!(
                "`{other}` is not one of CREATE_NEVER|CREATE_IF_NEEDED"
            ))),
        }
    }
}

impl fmt::Display for CreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BigQuery `source_format` for load jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    Avro,
    Csv,
    DatastoreBackup,
    #[default]
    NewlineDelimitedJson,
    Orc,
    Parquet,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Avro => "AVRO",
            SourceFormat::Csv => "CSV",
            SourceFormat::DatastoreBackup => "DATASTORE_BACKUP",
            SourceFormat::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
            SourceFormat::Orc => "ORC",
            SourceFormat::Parquet => "PARQUET",
        }
    }
}

impl FromStr for SourceFormat {
    type Err = FluentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVRO" => Ok(SourceFormat::Avro),
            "CSV" => Ok(SourceFormat::Csv),
            "DATASTORE_BACKUP" => Ok(SourceFormat::DatastoreBackup),
            "NEWLINE_DELIMITED_JSON" => Ok(SourceFormat::NewlineDelimitedJson),
            "ORC" => Ok(SourceFormat::Orc),
            "PARQUET" => Ok(SourceFormat::Parquet),
            other => Err(FluentError::Validation(format!(
                "`{other}` is not a supported source format"
            ))),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_table() {
        assert!(qualified_table("dataset.table").is_ok());
        assert!(qualified_table("nodataset").is_err());
    }

    #[test]
    fn test_gcs_uri() {
        assert!(gcs_uri("gs://bucket/path").is_ok());
        assert!(gcs_uri("s3://bucket/path").is_err());
        assert!(gcs_uri("bucket/path").is_err());
    }

    #[test]
    fn test_read_query_accepts_select_and_with() {
        assert!(read_query("select * from t").is_ok());
        assert!(read_query("  SELECT 1").is_ok());
        assert!(read_query("WITH x AS (SELECT 1) SELECT * FROM x").is_ok());
        assert!(read_query("with x as (select 1) select 1").is_ok());
    }

    #[test]
    fn test_read_query_rejects_everything_else() {
        assert!(read_query("DELETE FROM t WHERE TRUE").is_err());
        assert!(read_query("INSERT INTO t VALUES (1)").is_err());
        assert!(read_query("TRUNCATE TABLE t").is_err());
        assert!(read_query("").is_err());
    }

    #[test]
    fn test_column_name() {
        assert!(is_column_name("name"));
        assert!(is_column_name("_private"));
        assert!(is_column_name("col_2"));
        assert!(!is_column_name("1bad"));
        assert!(!is_column_name("has space"));
        assert!(!is_column_name(""));
    }

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("WRITE_TRUNCATE".parse::<WriteMode>().unwrap(), WriteMode::Truncate);
        assert_eq!(WriteMode::default(), WriteMode::Append);
        let err = "OVERWRITE".parse::<WriteMode>().unwrap_err();
        assert!(err.to_string().contains("WRITE_EMPTY|WRITE_TRUNCATE|WRITE_APPEND"));
    }

    #[test]
    fn test_create_mode_parse() {
        assert_eq!("CREATE_NEVER".parse::<CreateMode>().unwrap(), CreateMode::Never);
        assert_eq!(CreateMode::default(), CreateMode::IfNeeded);
        assert!("NEVER".parse::<CreateMode>().is_err());
    }

    #[test]
    fn test_source_format_parse() {
        assert_eq!("PARQUET".parse::<SourceFormat>().unwrap(), SourceFormat::Parquet);
        assert_eq!(SourceFormat::default(), SourceFormat::NewlineDelimitedJson);
        assert!("XML".parse::<SourceFormat>().is_err());
    }
}
