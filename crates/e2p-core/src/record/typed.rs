//! Fixed-layout record variant.

use super::{coerce, value_to_string, RecordInfo};
use crate::{RecordError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A record with a fixed field layout.
///
/// Maps use `BTreeMap` so the canonical JSON and MessagePack renderings are
/// deterministic and round-trips are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedRecord {
    /// Event time in epoch seconds
    pub timestamp: f64,
    /// Severity level
    pub level: String,
    /// Log message
    pub message: String,

    pub correlation_id: String,
    pub session_id: String,
    pub person_id: String,
    pub device_id: String,

    /// Business taxonomy, source of the partition key
    pub capability: String,
    pub domain: String,
    pub service: String,
    pub application: String,

    pub http_method: String,
    pub http_path: String,
    pub http_status: i64,

    pub error_code: String,
    pub error_message: String,

    pub duration_ms: f64,

    pub trace_id: String,
    pub span_id: String,
    pub trace_sampled: bool,

    /// Free-form tag list
    pub tags: Vec<String>,
    /// Free-form key-value arguments
    pub args: BTreeMap<String, String>,
    /// Unrecognized input keys, in string form
    pub extra: BTreeMap<String, String>,

    #[serde(skip)]
    info: RecordInfo,
}

impl TypedRecord {
    /// Build from a lowercased input map. All-or-nothing: the first coercion
    /// failure aborts construction.
    pub(super) fn from_map(map: Map<String, Value>) -> Result<TypedRecord> {
        let mut record = TypedRecord::default();

        for (key, value) in map {
            match key.as_str() {
                "timestamp" => record.timestamp = coerced(&key, coerce::to_f64(&value))?,
                "level" => record.level = coerced(&key, coerce::to_string(&value))?,
                "message" => record.message = coerced(&key, coerce::to_string(&value))?,
                "correlation_id" => {
                    record.correlation_id = coerced(&key, coerce::to_string(&value))?
                }
                "session_id" => record.session_id = coerced(&key, coerce::to_string(&value))?,
                "person_id" => record.person_id = coerced(&key, coerce::to_string(&value))?,
                "device_id" => record.device_id = coerced(&key, coerce::to_string(&value))?,
                "capability" => record.capability = coerced(&key, coerce::to_string(&value))?,
                "domain" => record.domain = coerced(&key, coerce::to_string(&value))?,
                "service" => record.service = coerced(&key, coerce::to_string(&value))?,
                "application" => record.application = coerced(&key, coerce::to_string(&value))?,
                "http_method" => record.http_method = coerced(&key, coerce::to_string(&value))?,
                "http_path" => record.http_path = coerced(&key, coerce::to_string(&value))?,
                "http_status" => record.http_status = coerced(&key, coerce::to_i64(&value))?,
                "error_code" => record.error_code = coerced(&key, coerce::to_string(&value))?,
                "error_message" => {
                    record.error_message = coerced(&key, coerce::to_string(&value))?
                }
                "duration_ms" => record.duration_ms = coerced(&key, coerce::to_f64(&value))?,
                "trace_id" => record.trace_id = coerced(&key, coerce::to_string(&value))?,
                "span_id" => record.span_id = coerced(&key, coerce::to_string(&value))?,
                "trace_sampled" => record.trace_sampled = coerced(&key, coerce::to_bool(&value))?,
                "tags" => record.tags = coerced(&key, coerce::to_string_list(&value))?,
                "args" => record.args = coerced(&key, coerce::to_string_map(&value))?,
                _ => {
                    record.extra.insert(key, value_to_string(&value));
                }
            }
        }

        record.derive_info();
        Ok(record)
    }

    /// Recompute the derived taxonomy info. Called once at construction and
    /// after every decode; the info is never serialized.
    pub(super) fn derive_info(&mut self) {
        self.info = RecordInfo::new(
            &self.capability,
            &self.domain,
            &self.service,
            &self.application,
        );
    }

    pub fn info(&self) -> &RecordInfo {
        &self.info
    }
}

fn coerced<T>(field: &str, result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|reason| {
        RecordError::Decode {
            field: field.to_string(),
            reason,
        }
        .into()
    })
}
