//! Content fingerprinting over canonical JSON.
//!
//! The fingerprint is a cheap equality oracle: two equal fingerprints mean
//! the destination card does not need a re-render. Canonicalization sorts
//! object keys lexicographically at every nesting level and emits compact
//! JSON, so the same logical payload always hashes identically regardless of
//! insertion order.
//!
//! Only the fields that should drive a re-render go into the payload —
//! callers must exclude volatile metadata so unrelated churn never forces a
//! destination write.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Fingerprint a canonical-field payload: lowercase hex SHA-256 over the
/// canonical JSON serialization.
#[must_use]
pub fn fingerprint(payload: &Value) -> String {
    hex::encode(Sha256::digest(canonical_json(payload).as_bytes()))
}

/// Produce a canonical JSON string: compact, object keys sorted
/// lexicographically at every depth, array order preserved.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json's escaping; string serialization cannot fail.
            buf.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            buf.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(&Value::String((*key).clone()).to_string());
                buf.push(':');
                if let Some(val) = map.get(*key) {
                    write_canonical(val, buf);
                }
            }
            buf.push('}');
        }
    }
}
