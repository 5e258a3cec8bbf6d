//! Columnar schema selection.
//!
//! The typed record variant uses a statically declared field layout; the
//! dynamic variant reads a JSON schema description supplied out-of-band.

use crate::config::{Config, RecordVariant};
use crate::{ConvertError, Result};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// The static layout for typed records.
///
/// The free-form maps (`args`, `extra`) are carried as their JSON rendering
/// in a single column each.
pub fn typed_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Float64, false),
        Field::new("level", DataType::Utf8, false),
        Field::new("message", DataType::Utf8, false),
        Field::new("correlation_id", DataType::Utf8, false),
        Field::new("session_id", DataType::Utf8, false),
        Field::new("person_id", DataType::Utf8, false),
        Field::new("device_id", DataType::Utf8, false),
        Field::new("capability", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("application", DataType::Utf8, false),
        Field::new("http_method", DataType::Utf8, false),
        Field::new("http_path", DataType::Utf8, false),
        Field::new("http_status", DataType::Int64, false),
        Field::new("error_code", DataType::Utf8, false),
        Field::new("error_message", DataType::Utf8, false),
        Field::new("duration_ms", DataType::Float64, false),
        Field::new("trace_id", DataType::Utf8, false),
        Field::new("span_id", DataType::Utf8, false),
        Field::new("trace_sampled", DataType::Boolean, false),
        Field::new(
            "tags",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new("args", DataType::Utf8, false),
        Field::new("extra", DataType::Utf8, false),
    ]))
}

/// One field in a dynamic schema description.
#[derive(Debug, Deserialize)]
struct FieldDescription {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Parse a JSON schema description into an arrow schema.
///
/// The description is an array of `{"name": ..., "type": ...}` entries with
/// types `string`, `bool`, `double`, `int64` or `timestamp`.
pub fn parse_schema_description(text: &str) -> Result<SchemaRef> {
    let descriptions: Vec<FieldDescription> = serde_json::from_str(text)
        .map_err(|e| ConvertError::Schema(e.to_string()))?;

    if descriptions.is_empty() {
        return Err(ConvertError::Schema("schema has no fields".into()).into());
    }

    let mut fields = Vec::with_capacity(descriptions.len());
    for desc in descriptions {
        let data_type = match desc.kind.as_str() {
            "string" => DataType::Utf8,
            "bool" | "boolean" => DataType::Boolean,
            "double" | "float64" => DataType::Float64,
            "int64" | "int" => DataType::Int64,
            "timestamp" => DataType::Timestamp(TimeUnit::Millisecond, None),
            other => {
                return Err(ConvertError::Schema(format!(
                    "unsupported type '{}' for field '{}'",
                    other, desc.name
                ))
                .into())
            }
        };
        fields.push(Field::new(&desc.name, data_type, desc.nullable));
    }

    Ok(Arc::new(Schema::new(fields)))
}

/// Load and parse a schema description file.
pub fn load_schema_description(path: &Path) -> Result<SchemaRef> {
    let text = std::fs::read_to_string(path)?;
    parse_schema_description(&text)
}

/// Resolve the schema for a configured deployment.
pub fn schema_for(config: &Config) -> Result<SchemaRef> {
    match config.record.variant {
        RecordVariant::Typed => Ok(typed_schema()),
        RecordVariant::Dynamic => {
            let path = config.record.dynamic_schema_path.as_ref().ok_or_else(|| {
                crate::Error::Config(
                    "Dynamic record variant requires a schema description path".into(),
                )
            })?;
            load_schema_description(path)
        }
    }
}
