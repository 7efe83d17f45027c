// Path <-> JSON tree helpers. The store keeps one row per leaf: `a/b/c` -> JSON text.
// Objects are flattened into their children; scalars, arrays and empty objects are leaves.

use serde_json::{Map, Value};

/// Trims surrounding slashes and collapses empty segments: "/a//b/" -> "a/b".
pub(super) fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub(super) fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        normalize(child)
    } else {
        normalize(&format!("{}/{}", parent, child))
    }
}

/// Proper ancestors of `path`, nearest last: "a/b/c" -> ["a", "a/b"].
pub(super) fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).map(|n| parts[..n].join("/")).collect()
}

/// Leaf rows for `value` stored at `path`.
pub(super) fn flatten(path: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten(&join(path, k), v, out);
            }
        }
        _ => out.push((path.to_string(), value.to_string())),
    }
}

/// Rebuilds the subtree under `root` from leaf rows whose paths are `root` or below it.
pub(super) fn assemble(root: &str, rows: Vec<(String, Value)>) -> Option<Value> {
    let mut tree: Option<Value> = None;
    for (path, value) in rows {
        let rel = if root.is_empty() {
            path.as_str()
        } else if path == root {
            ""
        } else {
            match path.strip_prefix(root).and_then(|r| r.strip_prefix('/')) {
                Some(r) => r,
                None => continue,
            }
        };
        if rel.is_empty() {
            return Some(value);
        }
        let node = tree.get_or_insert_with(|| Value::Object(Map::new()));
        insert(node, rel, value);
    }
    tree
}

fn insert(node: &mut Value, rel: &str, value: Value) {
    let (head, rest) = match rel.split_once('/') {
        Some((h, r)) => (h, Some(r)),
        None => (rel, None),
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    match rest {
        None => {
            map.insert(head.to_string(), value);
        }
        Some(rest) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            insert(child, rest, value);
        }
    }
}
