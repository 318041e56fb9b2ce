//! Canonical JSON encoding for chain payloads
//!
//! The chain hash is only reproducible if the payload bytes are: keys are
//! emitted in sorted order with compact separators, independent of struct
//! field order or serde_json feature flags.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Serialize a value to canonical JSON: sorted object keys, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON rendering.
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_and_compact() {
        let v = json!({"zeta": 1, "alpha": {"b": 2, "a": 3}, "mid": [1, 2]});
        let canon = canonical_json(&v).unwrap();
        assert_eq!(canon, r#"{"alpha":{"a":3,"b":2},"mid":[1,2],"zeta":1}"#);
    }

    #[test]
    fn test_stable_across_calls() {
        let v = json!({"user_id": "u1", "clip_seconds": 31.5, "v": 1});
        assert_eq!(canonical_json(&v).unwrap(), canonical_json(&v).unwrap());
    }

    #[test]
    fn test_string_escaping() {
        let v = json!({"k": "line\nbreak\"quote"});
        let canon = canonical_json(&v).unwrap();
        assert_eq!(canon, r#"{"k":"line\nbreak\"quote"}"#);
    }
}
