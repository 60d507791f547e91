//! Canonical-JSON request hashing (spec §3: `request_hash = SHA-256
//! (canonical-JSON(request_body))`, spec §8 property 7: the same hash on
//! any platform).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonicalize `value` by recursively sorting object keys through a
/// `BTreeMap`, then hash the resulting bytes with SHA-256, hex-encoded.
///
/// `serde_json::Value`'s own map is already a `BTreeMap` when the
/// `preserve_order` feature is off (the workspace never enables it), so
/// this mostly makes that ordering explicit and stable against any future
/// feature-flag drift rather than doing real canonicalization work.
pub fn canonical_json_hash(value: &Value) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"project": "P1", "amount": "5000.00", "currency": "IDR"});
        let b = json!({"currency": "IDR", "amount": "5000.00", "project": "P1"});
        assert_eq!(canonical_json_hash(&a).unwrap(), canonical_json_hash(&b).unwrap());
    }

    #[test]
    fn different_bodies_hash_differently() {
        let a = json!({"amount": "5000.00"});
        let b = json!({"amount": "5000.01"});
        assert_ne!(canonical_json_hash(&a).unwrap(), canonical_json_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let a = json!({"nested": {"b": 1, "a": 2}, "list": [3, 1, 2]});
        let first = canonical_json_hash(&a).unwrap();
        let second = canonical_json_hash(&a).unwrap();
        assert_eq!(first, second);
    }
}
