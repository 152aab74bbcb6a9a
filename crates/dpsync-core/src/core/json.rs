//! Access into untyped management-API payloads.
//!
//! Appliance responses have no stable schema, so the engine works on
//! [`serde_json::Value`] trees and walks them by explicit paths.

use serde_json::Value;

/// One step of a JSON path: a mapping key or a list index.
///
/// Anything else is not a valid path step, which the type makes
/// unrepresentable instead of panicking at lookup time.
#[derive(Clone, Copy, Debug)]
pub enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for Step<'a> {
    fn from(key: &'a str) -> Self {
        Step::Key(key)
    }
}

impl From<usize> for Step<'_> {
    fn from(index: usize) -> Self {
        Step::Index(index)
    }
}

/// Walks `root` along `path`, returning `None` on any key/type mismatch.
///
/// Absence propagates silently: a missing key, an out-of-range index, or a
/// step applied to a node of the wrong shape all yield `None`.
pub fn value_at<'a>(root: &'a Value, path: &[Step<'_>]) -> Option<&'a Value> {
    let mut current = root;
    for step in path {
        current = match (step, current) {
            (Step::Key(key), Value::Object(map)) => map.get(*key)?,
            (Step::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// String at `path`, or `None` when absent or not a string.
pub fn string_at<'a>(root: &'a Value, path: &[Step<'_>]) -> Option<&'a str> {
    value_at(root, path).and_then(Value::as_str)
}

/// Normalizes the management API's list-or-single ambiguity.
///
/// Several endpoints return either one mapping or a list of mappings under
/// the same key (`filestore/location/file` being the usual offender). Absent
/// and `null` become empty, a single mapping becomes a singleton list, and a
/// list is passed through.
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value @ Value::Object(_)) => vec![value],
        Some(_) => Vec::new(),
    }
}
