//! Deterministic cache-key derivation.
//!
//! A key is `<prefix>:<sha256-hex>` where the digest covers the canonical
//! JSON encoding of the request parameters: object keys sorted, `null`
//! members dropped, arrays kept in their given order.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Derive the cache key for `params` under a resource `prefix`.
///
/// Parameters that fail to serialize collapse to `null`, which still yields a
/// stable key for the prefix.
pub fn derive_key<P: Serialize + ?Sized>(prefix: &str, params: &P) -> String {
    let value = serde_json::to_value(params).unwrap_or(Value::Null);
    let canonical = canonicalize(&value).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{prefix}:{digest:x}")
}

/// Normalize a JSON value into its canonical form.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
