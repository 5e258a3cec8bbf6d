//! Record data model.
//!
//! A record is one ingested event, normalized from a JSON-decoded input map
//! into one of two variants:
//!
//! - `Typed`: a fixed field layout with type-checked coercion
//! - `Dynamic`: an open key-value map paired with an out-of-band schema
//!
//! Both variants expose the same capability set: a stable partition key
//! derived from the business taxonomy fields, lossless JSON and MessagePack
//! round-trips, and a debug rendering for logs.

mod coerce;
mod dynamic;
mod info;
mod typed;

pub use dynamic::DynamicRecord;
pub use info::{RecordInfo, KEY_SEPARATOR, UNKNOWN_SEGMENT};
pub use typed::TypedRecord;

use crate::config::RecordVariant;
use crate::{RecordError, Result};
use serde_json::{Map, Value};

/// One ingested event.
///
/// Variants are matched exhaustively at every encode/decode boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Fixed field layout
    Typed(TypedRecord),
    /// Open key-value map
    Dynamic(DynamicRecord),
}

impl Record {
    /// Construct a record from a JSON-decoded input map.
    ///
    /// Keys are matched case-insensitively. Known keys populate typed fields
    /// with type-checked coercion; a mistyped value fails the whole
    /// construction with a decode error. Unknown keys land in the overflow
    /// map in string form.
    pub fn new(variant: RecordVariant, map: Map<String, Value>) -> Result<Record> {
        let map = lowercase_keys(map);
        match variant {
            RecordVariant::Typed => Ok(Record::Typed(TypedRecord::from_map(map)?)),
            RecordVariant::Dynamic => Ok(Record::Dynamic(DynamicRecord::from_map(map))),
        }
    }

    /// The variant of this record.
    pub fn variant(&self) -> RecordVariant {
        match self {
            Record::Typed(_) => RecordVariant::Typed,
            Record::Dynamic(_) => RecordVariant::Dynamic,
        }
    }

    /// The composite partition key.
    pub fn key(&self) -> &str {
        self.info().key()
    }

    /// The derived taxonomy info.
    pub fn info(&self) -> &RecordInfo {
        match self {
            Record::Typed(r) => r.info(),
            Record::Dynamic(r) => r.info(),
        }
    }

    /// Canonical JSON rendering.
    ///
    /// `from_text(to_text())` reproduces a record whose `to_text` output is
    /// byte-identical: map fields are `BTreeMap`s so key order is total.
    pub fn to_text(&self) -> Result<String> {
        let text = match self {
            Record::Typed(r) => serde_json::to_string(r)?,
            Record::Dynamic(r) => serde_json::to_string(r)?,
        };
        Ok(text)
    }

    /// Parse the canonical JSON rendering back into a record.
    pub fn from_text(variant: RecordVariant, text: &str) -> Result<Record> {
        match variant {
            RecordVariant::Typed => {
                let mut record: TypedRecord = serde_json::from_str(text)
                    .map_err(|e| RecordError::Malformed(e.to_string()))?;
                record.derive_info();
                Ok(Record::Typed(record))
            }
            RecordVariant::Dynamic => {
                let mut record: DynamicRecord = serde_json::from_str(text)
                    .map_err(|e| RecordError::Malformed(e.to_string()))?;
                record.derive_info();
                Ok(Record::Dynamic(record))
            }
        }
    }

    /// Compact MessagePack rendering with the same identity guarantee as
    /// the JSON round-trip.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Record::Typed(r) => rmp_serde::to_vec_named(r)?,
            Record::Dynamic(r) => rmp_serde::to_vec_named(r)?,
        };
        Ok(bytes)
    }

    /// Parse the MessagePack rendering back into a record.
    pub fn from_binary(variant: RecordVariant, bytes: &[u8]) -> Result<Record> {
        match variant {
            RecordVariant::Typed => {
                let mut record: TypedRecord = rmp_serde::from_slice(bytes)
                    .map_err(|e| RecordError::Malformed(e.to_string()))?;
                record.derive_info();
                Ok(Record::Typed(record))
            }
            RecordVariant::Dynamic => {
                let mut record: DynamicRecord = rmp_serde::from_slice(bytes)
                    .map_err(|e| RecordError::Malformed(e.to_string()))?;
                record.derive_info();
                Ok(Record::Dynamic(record))
            }
        }
    }

    /// Human-readable rendering for logs. Non-normative.
    pub fn to_debug_string(&self) -> String {
        format!("{:#?}", self)
    }
}

/// Normalize input map keys to lowercase. Later duplicates win.
fn lowercase_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect()
}

/// Render an overflow value in string form.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
