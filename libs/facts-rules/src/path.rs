//! Dotted path resolution over nested JSON objects
//!
//! Paths such as `"d.d1b.d2a"` address values inside nested objects.
//! Reads are tolerant: walking through anything that is not an object
//! yields `None`. Writes replace non-object intermediates with empty
//! objects, so overwriting a parent with a scalar prunes every path below it.

use serde_json::{Map, Value};

/// Path segment separator
pub const SEPARATOR: char = '.';

/// Resolve `path` inside `root`
pub fn get<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let Some((head, rest)) = path.split_once(SEPARATOR) else {
        return root.get(path);
    };

    let mut current = root.get(head)?;
    for segment in rest.split(SEPARATOR) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Assign `value` at `path` inside `root`, creating or replacing
/// intermediate objects as needed
pub fn set(root: &mut Map<String, Value>, path: &str, value: Value) {
    let Some((parents, leaf)) = path.rsplit_once(SEPARATOR) else {
        root.insert(path.to_string(), value);
        return;
    };

    let mut node = root;
    for segment in parents.split(SEPARATOR) {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry {
            Value::Object(map) => map,
            _ => unreachable!("intermediate node was just replaced by an object"),
        };
    }
    node.insert(leaf.to_string(), value);
}

/// Every ancestor path of `path`, ending with `path` itself
///
/// `"d.d1b.d2a"` yields `["d", "d.d1b", "d.d1b.d2a"]`.
pub fn prefixes(path: &str) -> Vec<String> {
    path.match_indices(SEPARATOR)
        .map(|(idx, _)| path[..idx].to_string())
        .chain(std::iter::once(path.to_string()))
        .collect()
}

/// Whether `path` is `ancestor` itself or lies below it
///
/// `"d.e"` is within `"d"`; `"de"` is not.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(SEPARATOR))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Map<String, Value> {
        match json!({
            "a": 1,
            "d": {
                "d1a": "left",
                "d1b": { "d2a": 3, "d2b": [1, 2] }
            }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_get_single_segment() {
        let root = tree();
        assert_eq!(get(&root, "a"), Some(&json!(1)));
        assert_eq!(get(&root, "missing"), None);
    }

    #[test]
    fn test_get_nested() {
        let root = tree();
        assert_eq!(get(&root, "d.d1b.d2a"), Some(&json!(3)));
        assert_eq!(get(&root, "d.d1a"), Some(&json!("left")));
        assert_eq!(get(&root, "d.d1b.nope"), None);
    }

    #[test]
    fn test_get_through_scalar_is_none() {
        let root = tree();
        assert_eq!(get(&root, "a.b"), None);
        assert_eq!(get(&root, "d.d1a.x.y"), None);
        // Arrays are not objects, so they are not traversed either
        assert_eq!(get(&root, "d.d1b.d2b.0"), None);
    }

    #[test]
    fn test_set_then_get() {
        let mut root = tree();
        set(&mut root, "d.d1b.d2a", json!(4));
        assert_eq!(get(&root, "d.d1b.d2a"), Some(&json!(4)));
        assert_eq!(get(&root, "d.d1b.d2b"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_set_creates_missing_parents() {
        let mut root = Map::new();
        set(&mut root, "p.q.r", json!(true));
        assert_eq!(get(&root, "p.q.r"), Some(&json!(true)));
        assert!(get(&root, "p.q").unwrap().is_object());
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut root = tree();
        set(&mut root, "a.b", json!(2));
        assert_eq!(get(&root, "a"), Some(&json!({ "b": 2 })));
    }

    #[test]
    fn test_overwrite_prunes_subtree() {
        let mut root = tree();
        set(&mut root, "d.d1b", json!(false));

        assert_eq!(get(&root, "d.d1b.d2a"), None);
        assert_eq!(get(&root, "d.d1b"), Some(&json!(false)));
        assert_eq!(get(&root, "d.d1a"), Some(&json!("left")));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(prefixes("x"), vec!["x"]);
        assert_eq!(prefixes("d.d1b.d2a"), vec!["d", "d.d1b", "d.d1b.d2a"]);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("d", "d"));
        assert!(is_within("d.e", "d"));
        assert!(is_within("d.e.f", "d.e"));
        assert!(!is_within("de", "d"));
        assert!(!is_within("d", "d.e"));
    }
}
