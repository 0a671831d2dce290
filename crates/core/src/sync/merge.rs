//! Timestamp and patch-merge helpers for local mutations.

use chrono::Utc;

/// Current time in epoch milliseconds, the engine's `last_modified` clock.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Merge `patch` into `target` (RFC 7396 semantics).
///
/// Object members are merged recursively, `null` removes a member, any
/// non-object patch replaces the target wholesale.
pub fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match patch {
        serde_json::Value::Object(patch_map) => {
            if !target.is_object() {
                *target = serde_json::Value::Object(serde_json::Map::new());
            }
            let target_map = target.as_object_mut().expect("target coerced to object");
            for (key, value) in patch_map {
                if value.is_null() {
                    target_map.remove(key);
                } else {
                    merge_patch(
                        target_map
                            .entry(key.clone())
                            .or_insert(serde_json::Value::Null),
                        value,
                    );
                }
            }
        }
        _ => {
            *target = patch.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_scalar_fields() {
        let mut target = json!({"category": "beef", "status": "active"});
        merge_patch(&mut target, &json!({"status": "sold"}));
        assert_eq!(target, json!({"category": "beef", "status": "sold"}));
    }

    #[test]
    fn merge_null_removes_field() {
        let mut target = json!({"notes": "limping", "category": "beef"});
        merge_patch(&mut target, &json!({"notes": null}));
        assert_eq!(target, json!({"category": "beef"}));
    }

    #[test]
    fn merge_adds_new_fields() {
        let mut target = json!({"category": "beef"});
        merge_patch(&mut target, &json!({"breed": "angus"}));
        assert_eq!(target, json!({"category": "beef", "breed": "angus"}));
    }

    #[test]
    fn now_millis_is_monotone_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}
