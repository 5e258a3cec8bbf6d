//! Open-map record variant.

use super::{RecordInfo, UNKNOWN_SEGMENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A record with no fixed schema: an open key-value map plus a derived
/// taxonomy summary. Used when the deployment supplies the schema
/// description out-of-band instead of declaring a typed layout.
///
/// Serializes transparently as the map itself; `BTreeMap` ordering makes the
/// rendering canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicRecord {
    fields: BTreeMap<String, Value>,

    #[serde(skip)]
    info: RecordInfo,
}

impl DynamicRecord {
    /// Build from a lowercased input map. The open map accepts any value;
    /// only the taxonomy summary is derived.
    pub(super) fn from_map(map: Map<String, Value>) -> DynamicRecord {
        let mut record = DynamicRecord {
            fields: map.into_iter().collect(),
            info: RecordInfo::default(),
        };
        record.derive_info();
        record
    }

    /// Recompute the derived taxonomy summary from the map's taxonomy keys.
    /// Non-string values fall back to the unknown sentinel.
    pub(super) fn derive_info(&mut self) {
        let taxonomy = |key: &str| -> &str {
            self.fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_SEGMENT)
        };
        self.info = RecordInfo::new(
            taxonomy("capability"),
            taxonomy("domain"),
            taxonomy("service"),
            taxonomy("application"),
        );
    }

    pub fn info(&self) -> &RecordInfo {
        &self.info
    }

    /// The open field map.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Look up a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
