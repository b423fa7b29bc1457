//! Object normalization for comparison
//!
//! Pure functions that prepare a desired or live object for diffing: strip
//! server-populated metadata, drop empty annotation/label maps, and fold a
//! Secret's `stringData` into `data` so both encodings compare equal.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Metadata fields the API server populates; never meaningful in a diff.
const SERVER_FIELDS: &[&str] = &[
    "creationTimestamp",
    "resourceVersion",
    "uid",
    "selfLink",
    "generation",
];

/// Returns a copy of `obj` prepared for comparison.
///
/// A Secret whose `stringData` carries a non-string value is malformed; the
/// comparator turns the error into a condition and an unconditional
/// OutOfSync.
pub fn normalize(obj: &Value) -> Result<Value> {
    let mut out = obj.clone();
    strip_server_fields(&mut out);
    if super::resource_meta::kind_of(&out) == "Secret" {
        normalize_secret(&mut out)?;
    }
    Ok(out)
}

fn strip_server_fields(obj: &mut Value) {
    if let Some(map) = obj.as_object_mut() {
        map.remove("status");
    }
    let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    for field in SERVER_FIELDS {
        metadata.remove(*field);
    }
    // An empty map must compare equal to an absent one.
    for field in ["annotations", "labels"] {
        if metadata
            .get(field)
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty)
        {
            metadata.remove(field);
        }
    }
}

/// Folds `stringData` into `data`, base64-encoding the values. Keys already
/// present in `data` win on collision, matching apply semantics.
fn normalize_secret(obj: &mut Value) -> Result<()> {
    let Some(map) = obj.as_object_mut() else {
        return Ok(());
    };
    let Some(string_data) = map.remove("stringData") else {
        return Ok(());
    };
    let Some(string_data) = string_data.as_object() else {
        return Err(Error::ManifestError(
            "Secret stringData must be a map of strings".to_string(),
        ));
    };

    let data = map
        .entry("data".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(data) = data.as_object_mut() else {
        return Err(Error::ManifestError(
            "Secret data must be a map".to_string(),
        ));
    };
    for (key, value) in string_data {
        let Some(plain) = value.as_str() else {
            return Err(Error::ManifestError(format!(
                "Secret stringData value for key '{key}' is not a string"
            )));
        };
        data.entry(key.clone())
            .or_insert_with(|| Value::String(BASE64.encode(plain)));
    }
    Ok(())
}

/// Removes `metadata.namespace`, and with it an annotations map left empty.
///
/// Applied to the desired object when the live side is cluster-scoped, and to
/// recorded last-applied snapshots, whose serialized form routinely carries a
/// namespace and an empty annotations map the live object does not show.
pub fn remove_namespace(obj: &mut Value) {
    let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    metadata.remove("namespace");
    if metadata
        .get("annotations")
        .and_then(Value::as_object)
        .is_some_and(Map::is_empty)
    {
        metadata.remove("annotations");
    }
}

/// Rewrites whole-valued floats as integers so numbers that round-trip
/// through different decoders compare equal.
pub fn canonicalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if n.as_i64().is_none() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    *value = Value::from(f as i64);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(canonicalize_numbers),
        Value::Object(map) => map.values_mut().for_each(canonicalize_numbers),
        _ => {}
    }
}
