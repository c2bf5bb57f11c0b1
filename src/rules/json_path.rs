//! Turn a click on a rendered JSON node into a canonical path and the value
//! found there.
//!
//! The tree renderer reports the keys from the clicked node up to a
//! synthetic root label, e.g. `["id", 0, "items", "root"]`. The label is
//! dropped and the rest reversed into `root.items[0].id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;

/// Literal every derived path starts with
pub const ROOT_MARKER: &str = "root";

/// One key reported by the tree renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        NodeKey::Text(key.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(key: String) -> Self {
        NodeKey::Text(key)
    }
}

impl From<u64> for NodeKey {
    fn from(index: u64) -> Self {
        NodeKey::Number(index.into())
    }
}

impl From<i64> for NodeKey {
    fn from(index: i64) -> Self {
        NodeKey::Number(index.into())
    }
}

/// A resolved step in a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Index(usize),
    Member(String),
}

impl From<&NodeKey> for Segment {
    fn from(key: &NodeKey) -> Self {
        match key {
            NodeKey::Number(number) => match whole_number(number).and_then(|n| usize::try_from(n).ok()) {
                Some(index) => Segment::Index(index),
                None => Segment::Member(number.to_string()),
            },
            NodeKey::Text(text) => {
                let trimmed = text.trim();
                let all_digits = !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit());
                match all_digits.then(|| trimmed.parse::<usize>().ok()).flatten() {
                    Some(index) => Segment::Index(index),
                    None => Segment::Member(text.clone()),
                }
            }
        }
    }
}

/// Non-negative integer value of `number`, including floats like `1.0`
fn whole_number(number: &serde_json::Number) -> Option<u64> {
    number.as_u64().or_else(|| {
        number
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Path and value derived from a node selection
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedPath {
    pub path: String,
    pub segments: Vec<Segment>,
    /// `None` when the path does not resolve inside the root value
    pub value: Option<Value>,
}

/// Convert a leaf-to-root key path into root-to-leaf segments, dropping the
/// synthetic root label at the end
pub fn segments_from_key_path(key_path: &[NodeKey]) -> Vec<Segment> {
    let (_root_label, keys) = match key_path.split_last() {
        Some(split) => split,
        None => return Vec::new(),
    };

    keys.iter().rev().map(Segment::from).collect()
}

/// Render segments as `root.member[index]...`
pub fn render_path(segments: &[Segment]) -> String {
    let mut path = String::from(ROOT_MARKER);
    for segment in segments {
        match segment {
            Segment::Index(index) => {
                let _ = write!(path, "[{}]", index);
            }
            Segment::Member(name) => {
                path.push('.');
                path.push_str(name);
            }
        }
    }
    path
}

/// Walk `root` along `segments`. Returns `None` as soon as a step has
/// nowhere to go.
pub fn resolve<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match (segment, current) {
        (Segment::Index(index), Value::Array(items)) => items.get(*index),
        // Objects can have numeric-looking member names
        (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
        (Segment::Member(name), Value::Object(map)) => map.get(name),
        _ => None,
    })
}

/// Derive the canonical path for `key_path` and resolve it in `root`
pub fn derive(root: &Value, key_path: &[NodeKey]) -> DerivedPath {
    let segments = segments_from_key_path(key_path);
    let path = render_path(&segments);
    let value = resolve(root, &segments).cloned();

    DerivedPath { path, segments, value }
}

/// Textual form of a resolved value for rule seeding: pretty JSON for
/// containers, the literal for primitives, empty for null or absent
pub fn seed_value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(container @ (Value::Array(_) | Value::Object(_))) => {
            serde_json::to_string_pretty(container).unwrap_or_else(|_| container.to_string())
        }
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(raw: Value) -> Vec<NodeKey> {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_first_item_id() {
        let root = json!({ "items": [{ "id": 1 }, { "id": 2 }] });
        let derived = derive(&root, &keys(json!(["id", 0, "items", "root"])));

        assert_eq!(derived.path, "root.items[0].id");
        assert_eq!(derived.value, Some(json!(1)));
    }

    #[test]
    fn test_digit_strings_are_indices() {
        let root = json!({ "items": ["a", "b", "c"] });
        let derived = derive(&root, &[NodeKey::from(" 2 "), "items".into(), "root".into()]);

        assert_eq!(derived.segments, vec![Segment::Member("items".to_string()), Segment::Index(2)]);
        assert_eq!(derived.path, "root.items[2]");
        assert_eq!(derived.value, Some(json!("c")));
    }

    #[test]
    fn test_whole_floats_are_indices() {
        let key_path: Vec<NodeKey> = serde_json::from_value(json!(["id", 1.0, "items", "root"])).unwrap();
        let derived = derive(&json!({ "items": [{ "id": 1 }, { "id": 2 }] }), &key_path);
        assert_eq!(derived.path, "root.items[1].id");
        assert_eq!(derived.value, Some(json!(2)));
    }

    #[test]
    fn test_negative_and_fractional_numbers_are_members() {
        assert_eq!(Segment::from(&NodeKey::from(-1i64)), Segment::Member("-1".to_string()));
        let fractional: NodeKey = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(Segment::from(&fractional), Segment::Member("1.5".to_string()));
        assert_eq!(Segment::from(&NodeKey::from("v2")), Segment::Member("v2".to_string()));
    }

    #[test]
    fn test_out_of_range_is_absent() {
        let root = json!({ "items": [{ "id": 1 }] });
        let derived = derive(&root, &keys(json!(["id", 5, "items", "root"])));

        assert_eq!(derived.path, "root.items[5].id");
        assert_eq!(derived.value, None);
    }

    #[test]
    fn test_walking_through_primitives_is_absent() {
        let root = json!({ "name": "alice", "tags": ["x"] });
        assert_eq!(derive(&root, &keys(json!(["first", "name", "root"]))).value, None);
        assert_eq!(derive(&root, &keys(json!(["len", "tags", "root"]))).value, None);
        assert_eq!(derive(&root, &keys(json!(["missing", "root"]))).value, None);
    }

    #[test]
    fn test_numeric_member_names_on_objects_resolve() {
        let root = json!({ "byCode": { "404": "not found" } });
        let derived = derive(&root, &keys(json!(["404", "byCode", "root"])));
        assert_eq!(derived.path, "root.byCode[404]");
        assert_eq!(derived.value, Some(json!("not found")));
    }

    #[test]
    fn test_root_only() {
        let root = json!([1, 2]);
        let derived = derive(&root, &keys(json!(["root"])));
        assert_eq!(derived.path, "root");
        assert_eq!(derived.value, Some(root.clone()));

        assert_eq!(derive(&root, &[]).path, "root");
    }

    #[test]
    fn test_seed_value_text() {
        assert_eq!(seed_value_text(None), "");
        assert_eq!(seed_value_text(Some(&json!(null))), "");
        assert_eq!(seed_value_text(Some(&json!("plain"))), "plain");
        assert_eq!(seed_value_text(Some(&json!(42))), "42");
        assert_eq!(seed_value_text(Some(&json!(false))), "false");
        assert_eq!(seed_value_text(Some(&json!({ "a": 1 }))), "{\n  \"a\": 1\n}");
    }
}
