//! Attribute bags and explicit-value diffing.
//!
//! The external system models every entity as a bag of named attributes.
//! Desired bags carry only the fields the request explicitly supplied, so
//! diffing a desired bag against a current bag implements the partial-update
//! rule: an omitted field never overwrites existing state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl AttrValue {
    /// Render the value for plan output and backend calls.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Str(v) => v.clone(),
            Self::List(v) => v.join(", "),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// An ordered attribute bag.
///
/// Ordered so that plans and backend calls are deterministic.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Collect the entries of `desired` that differ from `current`.
///
/// `desired` holds only explicitly supplied fields; fields absent from it
/// never produce a change. A desired field missing from `current` counts as
/// changed.
pub fn changed_attrs(current: &AttrMap, desired: &AttrMap) -> AttrMap {
    desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Build an attribute bag from `(key, optional value)` pairs, keeping only
/// the supplied ones.
pub fn supplied<I>(fields: I) -> AttrMap
where
    I: IntoIterator<Item = (&'static str, Option<AttrValue>)>,
{
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: &[(&str, AttrValue)]) -> AttrMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_omitted_fields_never_diff() {
        let current = bag(&[
            ("Comments", "old".into()),
            ("enable", true.into()),
        ]);
        let desired = bag(&[("Comments", "updated".into())]);

        let changed = changed_attrs(&current, &desired);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("Comments"), Some(&"updated".into()));
    }

    #[test]
    fn test_equal_values_do_not_diff() {
        let current = bag(&[("Comments", "same".into())]);
        let desired = bag(&[("Comments", "same".into())]);
        assert!(changed_attrs(&current, &desired).is_empty());
    }

    #[test]
    fn test_new_attribute_counts_as_changed() {
        let current = AttrMap::new();
        let desired = bag(&[("Version", "24.09".into())]);
        assert_eq!(changed_attrs(&current, &desired).len(), 1);
    }

    #[test]
    fn test_supplied_drops_omitted() {
        let attrs = supplied([
            ("Comments", Some(AttrValue::from("text"))),
            ("Version", None),
            ("hide", Some(AttrValue::from(false))),
        ]);
        assert_eq!(attrs.len(), 2);
        assert!(attrs.contains_key("Comments"));
        assert!(!attrs.contains_key("Version"));
    }
}
