//! Dotted-path access into JSON state, used for selective persistence.
//!
//! A path like `user.preferences` addresses nested object fields. Array
//! indexing is not supported; a path segment always names an object field.

use serde_json::{Map, Value};

/// The value at `path`, if every segment resolves to an object field.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Set `path` to `new_value`, creating intermediate objects as needed.
///
/// A non-object value found along the way is replaced by an object.
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let node = current;
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(fields) = node else {
            return;
        };
        if segments.peek().is_none() {
            fields.insert(segment.to_owned(), new_value);
            return;
        }
        current = fields
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// An object holding only the listed paths of `state`. Paths that do not
/// resolve are left out.
pub fn pick_paths(state: &Value, paths: &[String]) -> Value {
    let mut picked = Value::Object(Map::new());
    for path in paths {
        if let Some(found) = get_path(state, path) {
            set_path(&mut picked, path, found.clone());
        }
    }
    picked
}

/// Merge `patch` into `target`. Objects merge field by field, recursively;
/// every other value (arrays included) replaces what was there.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_nested_path() {
        let state = json!({ "user": { "prefs": { "zoom": 2 } }, "list": [1] });
        assert_eq!(get_path(&state, "user.prefs.zoom"), Some(&json!(2)));
        assert_eq!(get_path(&state, "user.missing"), None);
        assert_eq!(get_path(&state, "list.0"), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut state = json!({ "user": 5 });
        set_path(&mut state, "user.prefs.zoom", json!(3));
        assert_eq!(state, json!({ "user": { "prefs": { "zoom": 3 } } }));
    }

    #[test]
    fn pick_keeps_only_listed_paths() {
        let state = json!({ "todos": [1, 2], "user": { "name": "a", "token": "x" }, "tmp": 1 });
        let picked = pick_paths(
            &state,
            &["todos".to_owned(), "user.name".to_owned(), "nope.deep".to_owned()],
        );
        assert_eq!(picked, json!({ "todos": [1, 2], "user": { "name": "a" } }));
    }

    #[test]
    fn merge_is_deep_for_objects_only() {
        let mut state = json!({ "a": { "x": 1, "y": 2 }, "list": [1, 2, 3], "keep": true });
        deep_merge(&mut state, json!({ "a": { "y": 20, "z": 30 }, "list": [9] }));
        assert_eq!(
            state,
            json!({ "a": { "x": 1, "y": 20, "z": 30 }, "list": [9], "keep": true })
        );
    }
}
