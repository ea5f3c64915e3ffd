//! BigQuery schema field descriptors.
//!
//! Serializes to the REST `TableFieldSchema` shape so an explicit schema can
//! be handed to the service layer as-is.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BqType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    Bignumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Json,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: BqType,
    pub mode: FieldMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: BqType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            description: None,
        }
    }

    pub fn required(name: impl Into<String>, field_type: BqType) -> Self {
        Self {
            mode: FieldMode::Required,
            ..Self::new(name, field_type)
        }
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_defaults_to_nullable() {
        let f = Field::new("name", BqType::String);
        assert_eq!(f.mode, FieldMode::Nullable);
        assert!(f.description.is_none());
    }

    #[test]
    fn test_field_serializes_to_rest_shape() {
        let f = Field::required("exec_id", BqType::Integer).with_description("desc");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "exec_id",
                "type": "INTEGER",
                "mode": "REQUIRED",
                "description": "desc",
            })
        );
    }

    #[test]
    fn test_description_omitted_when_unset() {
        let json = serde_json::to_value(Field::new("ts", BqType::Timestamp)).unwrap();
        assert!(json.get("description").is_none());
    }
}
