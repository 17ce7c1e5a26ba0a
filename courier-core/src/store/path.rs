//! Path handling and JSON tree surgery shared by the store backends.
//!
//! A path is a `/`-separated list of segments. Leading, trailing and repeated
//! separators are ignored, so `"/a//b/"` and `"a/b"` name the same node. The
//! empty path names the root.

use serde_json::{Map, Value};

use super::StoreError;

pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn normalize(path: &str) -> Result<String, StoreError> {
    let segs = segments(path);
    for seg in &segs {
        if *seg == "." || *seg == ".." || seg.chars().any(char::is_control) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(segs.join("/"))
}

pub fn join(base: &str, child: &str) -> String {
    let mut segs = segments(base);
    segs.extend(segments(child));
    segs.join("/")
}

/// Strict ancestors of `path`, nearest last. `"a/b/c"` yields `["a", "a/b"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let segs = segments(path);
    (1..segs.len()).map(|n| segs[..n].join("/")).collect()
}

/// True when `ancestor` is `path` itself or one of its ancestors.
pub fn is_prefix(ancestor: &str, path: &str) -> bool {
    let a = segments(ancestor);
    let p = segments(path);
    a.len() <= p.len() && a.iter().zip(p.iter()).all(|(x, y)| x == y)
}

/// Two paths overlap when a write to one can change what is read at the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}

pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments(path) {
        node = node.as_object()?.get(seg)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Replace the node at `path`. A null (after pruning) deletes the node, and
/// objects left empty by the delete disappear with it.
pub fn write(root: &mut Value, path: &str, value: Value) {
    let segs = segments(path);
    write_at(root, &segs, prune(value));
}

fn write_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let now_empty = {
        let Value::Object(map) = node else {
            return;
        };
        let child = map.entry((*head).to_string()).or_insert(Value::Null);
        write_at(child, rest, value);
        if child.is_null() {
            map.remove(*head);
        }
        map.is_empty()
    };

    if now_empty {
        *node = Value::Null;
    }
}

/// Integer value stored at `path`, treating anything else as zero.
pub fn counter_value(root: &Value, path: &str) -> i64 {
    lookup(root, path).and_then(Value::as_i64).unwrap_or(0)
}

/// Drop nulls and empty objects. Arrays are leaves and are kept as they are.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

/// Split a tree into `(path, leaf)` rows rooted at `prefix`.
pub fn flatten(prefix: &str, value: Value) -> Vec<(String, Value)> {
    let mut rows = Vec::new();
    flatten_into(prefix.to_string(), prune(value), &mut rows);
    rows
}

fn flatten_into(prefix: String, value: Value, rows: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(join(&prefix, &key), child, rows);
            }
        }
        leaf => rows.push((prefix, leaf)),
    }
}

/// Rebuild the subtree at `base` from rows whose paths lie at or below it.
pub fn unflatten(base: &str, rows: Vec<(String, Value)>) -> Option<Value> {
    let depth = segments(base).len();
    let mut tree = Value::Null;
    for (path, leaf) in rows {
        let segs = segments(&path);
        if segs.len() < depth {
            continue;
        }
        write_at(&mut tree, &segs[depth..], leaf);
    }
    if tree.is_null() {
        None
    } else {
        Some(tree)
    }
}

/// Escape a literal for use inside a SQL `LIKE` pattern.
pub fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
