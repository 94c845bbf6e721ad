//! List reconciliation with add/remove/set semantics.
//!
//! List-valued sub-resources (folder paths, dependency lists) are edited
//! through one of three modes. `set` replaces the list, `add` unions into
//! it, `remove` subtracts from it. The modes are mutually exclusive within
//! a single request, and `set: []` is rejected because an empty target list
//! is indistinguishable from a deletion request.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Raw add/remove/set suboptions as they appear in a request document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListSpec<T> {
    pub add: Option<Vec<T>>,
    pub remove: Option<Vec<T>>,
    pub set: Option<Vec<T>>,
}

impl<T> ListSpec<T> {
    /// Validate mutual exclusion and convert into an edit.
    ///
    /// Returns `None` when no mode was supplied at all (the list is left
    /// untouched on update, or defaulted on create).
    pub fn into_edit(self, field: &str) -> Result<Option<ListEdit<T>>> {
        match (self.add, self.remove, self.set) {
            (None, None, None) => Ok(None),
            (Some(add), None, None) => Ok(Some(ListEdit::Add(add))),
            (None, Some(remove), None) => Ok(Some(ListEdit::Remove(remove))),
            (None, None, Some(set)) => {
                if set.is_empty() {
                    Err(Error::conflict(format!(
                        "{field}.set must not be empty; use state: absent to remove the entity"
                    )))
                } else {
                    Ok(Some(ListEdit::Set(set)))
                }
            }
            _ => Err(Error::validation(format!(
                "{field}.add, {field}.remove and {field}.set are mutually exclusive"
            ))),
        }
    }
}

/// A validated edit against a list-valued sub-resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEdit<T> {
    /// Replace the list with exactly these elements
    Set(Vec<T>),
    /// Union these elements into the list, order-preserving
    Add(Vec<T>),
    /// Subtract these elements from the list
    Remove(Vec<T>),
}

impl<T: Clone + PartialEq> ListEdit<T> {
    /// Resolve the edit against the current list.
    ///
    /// `add` preserves the current order and appends new elements in the
    /// order given, ignoring duplicates. `remove` drops matching elements
    /// and silently ignores elements that were never present.
    pub fn resolve(&self, current: &[T]) -> Vec<T> {
        match self {
            Self::Set(target) => dedup(target),
            Self::Add(extra) => {
                let mut result = current.to_vec();
                for item in extra {
                    if !result.contains(item) {
                        result.push(item.clone());
                    }
                }
                result
            }
            Self::Remove(victims) => current
                .iter()
                .filter(|item| !victims.contains(item))
                .cloned()
                .collect(),
        }
    }
}

fn dedup<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut result: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(
        add: Option<&[&str]>,
        remove: Option<&[&str]>,
        set: Option<&[&str]>,
    ) -> ListSpec<String> {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        ListSpec {
            add: add.map(owned),
            remove: remove.map(owned),
            set: set.map(owned),
        }
    }

    #[test]
    fn test_no_mode_is_none() {
        assert_eq!(spec(None, None, None).into_edit("paths").unwrap(), None);
    }

    #[test]
    fn test_set_exclusive_with_add_and_remove() {
        assert!(spec(Some(&["a"]), None, Some(&["b"])).into_edit("paths").is_err());
        assert!(spec(None, Some(&["a"]), Some(&["b"])).into_edit("paths").is_err());
        assert!(spec(Some(&["a"]), Some(&["b"]), None).into_edit("paths").is_err());
    }

    #[test]
    fn test_empty_set_is_conflict() {
        let err = spec(None, None, Some(&[])).into_edit("paths").unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_add_ignores_duplicates_and_preserves_order() {
        let current = vec!["Applications".to_string(), "Win11".to_string()];
        let edit = spec(Some(&["Win11", "Site 1", "Site 2"]), None, None)
            .into_edit("paths")
            .unwrap()
            .unwrap();
        assert_eq!(
            edit.resolve(&current),
            vec!["Applications", "Win11", "Site 1", "Site 2"]
        );
    }

    #[test]
    fn test_remove_ignores_missing() {
        let current = vec!["A".to_string(), "B".to_string()];
        let edit = spec(None, Some(&["B", "C"]), None)
            .into_edit("paths")
            .unwrap()
            .unwrap();
        assert_eq!(edit.resolve(&current), vec!["A"]);
    }

    #[test]
    fn test_set_replaces_and_dedups() {
        let current = vec!["Old".to_string()];
        let edit = spec(None, None, Some(&["X", "Y", "X"]))
            .into_edit("paths")
            .unwrap()
            .unwrap();
        assert_eq!(edit.resolve(&current), vec!["X", "Y"]);
    }

    #[test]
    fn test_add_then_remove_round_trips() {
        let original = vec!["Applications".to_string()];
        let add = ListEdit::Add(vec!["Extra".to_string()]);
        let remove = ListEdit::Remove(vec!["Extra".to_string()]);
        let after_add = add.resolve(&original);
        let after_remove = remove.resolve(&after_add);
        assert_eq!(after_remove, original);
    }
}
