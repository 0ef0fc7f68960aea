//! RFC-6902 JSON Patch engine.
//!
//! Thin wrapper over the `json-patch` crate: [`diff`] computes a patch
//! between two JSON values, [`apply`] applies one. Property that must
//! hold for all JSON-convertible `a, b`: `apply(a, diff(a, b)) == b`.

use serde_json::Value;

use crate::error::{Error, Result};

/// Compute the RFC-6902 patch that transforms `a` into `b`.
pub fn diff(a: &Value, b: &Value) -> json_patch::Patch {
    json_patch::diff(a, b)
}

/// Apply a patch to `state`, returning the resulting value.
///
/// Malformed operations (bad path, `test` mismatch, out-of-range
/// `move`/`copy`) surface as [`Error::BadPatch`].
pub fn apply(state: &Value, patch: &json_patch::Patch) -> Result<Value> {
    let mut out = state.clone();
    json_patch::patch(&mut out, patch).map_err(|e| Error::BadPatch(e.to_string()))?;
    Ok(out)
}

/// Fold a sequence of patches over an initial state, in order.
///
/// Used to reconstruct a run's `state` from its `STEP_COMPLETE` event
/// patches (spec property P1).
pub fn fold(initial: &Value, patches: impl IntoIterator<Item = json_patch::Patch>) -> Result<Value> {
    let mut acc = initial.clone();
    for p in patches {
        acc = apply(&acc, &p)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_add() {
        let a = json!({"x": 1});
        let b = json!({"x": 1, "y": 2});
        let p = diff(&a, &b);
        assert_eq!(apply(&a, &p).unwrap(), b);
    }

    #[test]
    fn round_trip_replace() {
        let a = json!({"x": 1, "y": "old"});
        let b = json!({"x": 1, "y": "new"});
        let p = diff(&a, &b);
        assert_eq!(apply(&a, &p).unwrap(), b);
    }

    #[test]
    fn round_trip_remove() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"x": 1});
        let p = diff(&a, &b);
        assert_eq!(apply(&a, &p).unwrap(), b);
    }

    #[test]
    fn round_trip_nested() {
        let a = json!({"outer": {"inner": [1, 2, 3]}});
        let b = json!({"outer": {"inner": [1, 2, 3, 4]}});
        let p = diff(&a, &b);
        assert_eq!(apply(&a, &p).unwrap(), b);
    }

    #[test]
    fn round_trip_identity_is_empty_patch() {
        let a = json!({"x": 1});
        let p = diff(&a, &a);
        assert!(p.0.is_empty());
        assert_eq!(apply(&a, &p).unwrap(), a);
    }

    #[test]
    fn malformed_patch_is_bad_patch_error() {
        let a = json!({"x": 1});
        let bad: json_patch::Patch = serde_json::from_value(json!([
            {"op": "remove", "path": "/does_not_exist"}
        ]))
        .unwrap();
        let err = apply(&a, &bad).unwrap_err();
        assert!(matches!(err, Error::BadPatch(_)));
    }

    #[test]
    fn fold_multiple_patches() {
        let initial = json!({});
        let p1: json_patch::Patch =
            serde_json::from_value(json!([{"op": "add", "path": "/x", "value": 1}])).unwrap();
        let p2: json_patch::Patch =
            serde_json::from_value(json!([{"op": "add", "path": "/y", "value": 3}])).unwrap();
        let result = fold(&initial, vec![p1, p2]).unwrap();
        assert_eq!(result, json!({"x": 1, "y": 3}));
    }
}
