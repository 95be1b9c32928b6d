use crate::error::{Result, StoreError};
use serde_json::Value;

/// Re-encodes a JSON value with object keys sorted lexicographically at every level, so
/// two semantically identical objects always produce the same byte string regardless of
/// field-insertion order. Every object stored by the engine must carry a `$type$`
/// discriminator field; this is checked here rather than at every call site.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>> {
    if !value
        .as_object()
        .map(|o| o.contains_key("$type$"))
        .unwrap_or(false)
    {
        return Err(StoreError::InvariantViolation(
            "object missing required $type$ discriminator".into(),
        ));
    }
    let sorted = sort_value(value);
    Ok(serde_json::to_vec(&sorted)?)
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for k in keys {
                sorted.insert(k.clone(), sort_value(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the canonical encoding of a full object. Two objects with
/// identical content (regardless of how they were constructed) hash to the
/// same content hash.
pub fn content_hash(value: &Value) -> Result<String> {
    let bytes = canonicalize(value)?;
    Ok(hex::encode(sha256(&bytes)))
}

/// SHA-256 over the canonical encoding of only the declared ID fields of an object. Two
/// versions of the "same" logical object (e.g. successive Subject edits) share an ID hash
/// even though their content hashes differ. `id_fields` must include `$type$` so the ID
/// hash is still namespaced by object kind; timestamps are rejected here because ID
/// identity must be stable across edits, and floats are rejected entirely — the wire
/// format only permits integer millisecond timestamps in ID-bearing fields.
pub fn id_hash(value: &Value, id_fields: &[&str]) -> Result<String> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::InvariantViolation("object is not a JSON object".into()))?;

    let mut projected = serde_json::Map::new();
    for field in id_fields {
        let v = obj.get(*field).ok_or_else(|| {
            StoreError::InvariantViolation(format!("missing declared id field `{}`", field))
        })?;
        reject_floats(v, field)?;
        projected.insert((*field).to_string(), v.clone());
    }

    let projected_value = Value::Object(projected);
    let bytes = canonicalize(&ensure_type(&projected_value, obj))?;
    Ok(hex::encode(sha256(&bytes)))
}

fn ensure_type(projected: &Value, original: &serde_json::Map<String, Value>) -> Value {
    let mut obj = projected.as_object().cloned().unwrap_or_default();
    if !obj.contains_key("$type$") {
        if let Some(t) = original.get("$type$") {
            obj.insert("$type$".to_string(), t.clone());
        }
    }
    Value::Object(obj)
}

fn reject_floats(value: &Value, field: &str) -> Result<()> {
    match value {
        Value::Number(n) if n.is_f64() && n.as_i64().is_none() && n.as_u64().is_none() => {
            Err(StoreError::InvariantViolation(format!(
                "id field `{}` must be an integer (millisecond timestamp), found a float",
                field
            )))
        }
        Value::Array(items) => {
            for item in items {
                reject_floats(item, field)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_content_hash() {
        let a = json!({"$type$": "Keyword", "term": "rust", "count": 1});
        let b = json!({"count": 1, "term": "rust", "$type$": "Keyword"});
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn id_hash_ignores_non_id_fields() {
        let v1 = json!({"$type$": "Subject", "id": "s1", "label": "a"});
        let v2 = json!({"$type$": "Subject", "id": "s1", "label": "b"});
        assert_eq!(
            id_hash(&v1, &["$type$", "id"]).unwrap(),
            id_hash(&v2, &["$type$", "id"]).unwrap()
        );
        assert_ne!(content_hash(&v1).unwrap(), content_hash(&v2).unwrap());
    }

    #[test]
    fn id_hash_rejects_float_timestamp() {
        let v = json!({"$type$": "Message", "id": "m1", "createdAt": 1.5});
        assert!(id_hash(&v, &["$type$", "id", "createdAt"]).is_err());
    }

    #[test]
    fn missing_type_is_rejected() {
        let v = json!({"id": "m1"});
        assert!(canonicalize(&v).is_err());
    }
}
