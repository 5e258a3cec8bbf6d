//! Type-checked coercion of JSON values into typed record fields.
//!
//! Every function returns a reason string on mismatch instead of silently
//! zeroing the target field; the caller wraps it into a decode error carrying
//! the field name.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("expected string, got {}", kind(other))),
    }
}

pub fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(format!("expected bool, got {}", kind(other))),
    }
}

pub fn to_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| "number out of f64 range".to_string()),
        other => Err(format!("expected number, got {}", kind(other))),
    }
}

pub fn to_i64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(f as i64)
                } else {
                    Err(format!("number {} is not an integer", f))
                }
            } else {
                Err("number out of i64 range".to_string())
            }
        }
        other => Err(format!("expected integer, got {}", kind(other))),
    }
}

pub fn to_string_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    other => {
                        return Err(format!(
                            "expected string at index {}, got {}",
                            i,
                            kind(other)
                        ))
                    }
                }
            }
            Ok(out)
        }
        other => Err(format!("expected list of strings, got {}", kind(other))),
    }
}

pub fn to_string_map(value: &Value) -> Result<BTreeMap<String, String>, String> {
    match value {
        Value::Object(entries) => {
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                match v {
                    Value::String(s) => {
                        out.insert(k.clone(), s.clone());
                    }
                    other => {
                        return Err(format!(
                            "expected string value for key '{}', got {}",
                            k,
                            kind(other)
                        ))
                    }
                }
            }
            Ok(out)
        }
        other => Err(format!("expected map of strings, got {}", kind(other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
