//! Entity identity resolution.
//!
//! Every managed entity carries a generated GUID and a human-assigned name.
//! A request may supply either; the GUID wins when both are given, and a
//! name supplied alongside a GUID is a rename. Deletion targets must be
//! unambiguous, so `state: absent` rejects requests naming both.

use crate::error::{Error, Result};
use crate::state::DesiredState;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A reference to an entity by GUID, name, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// The generated unique identifier, `{8-4-4-4-12}` hex
    pub guid: Option<String>,
    /// The human-assigned name
    pub name: Option<String>,
}

impl EntityRef {
    /// Create a reference from optional GUID and name.
    pub fn new(guid: Option<String>, name: Option<String>) -> Self {
        Self { guid, name }
    }

    /// Validate this reference as a lookup key for the given desired state.
    ///
    /// At least one of GUID/name is always required. For `state: absent`
    /// the two are mutually exclusive, since a mismatched pair would make
    /// the deletion target ambiguous.
    pub fn validate_for(&self, state: DesiredState) -> Result<()> {
        match (&self.guid, &self.name) {
            (None, None) => Err(Error::validation("one of guid or name is required")),
            (Some(_), Some(_)) if state.is_absent() => Err(Error::validation(
                "guid and name are mutually exclusive when state is absent",
            )),
            (Some(guid), _) if !is_guid(guid) => Err(Error::validation(format!(
                "not a valid GUID: {guid}"
            ))),
            _ => Ok(()),
        }
    }

    /// Whether a name was supplied alongside a GUID, i.e. a rename request.
    pub fn rename_target(&self) -> Option<&str> {
        match (&self.guid, &self.name) {
            (Some(_), Some(name)) => Some(name),
            _ => None,
        }
    }

    /// Describe the reference for error messages.
    pub fn describe(&self) -> String {
        match (&self.guid, &self.name) {
            (Some(guid), _) => guid.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => "<unidentified>".to_string(),
        }
    }
}

/// Resolve a reference through a pair of lookup functions.
///
/// The GUID is the primary key when given; the name is the fallback.
/// Callers must run [`EntityRef::validate_for`] first, so a reference with
/// neither key is a validation failure here as well.
pub fn resolve<R>(
    target: &EntityRef,
    by_guid: impl FnOnce(&str) -> Result<Option<R>>,
    by_name: impl FnOnce(&str) -> Result<Option<R>>,
) -> Result<Option<R>> {
    if let Some(guid) = &target.guid {
        by_guid(guid)
    } else if let Some(name) = &target.name {
        by_name(name)
    } else {
        Err(Error::validation("one of guid or name is required"))
    }
}

/// Check if a string is a braced GUID, e.g.
/// `{12345678-1234-1234-1234-123456789012}`.
pub fn is_guid(value: &str) -> bool {
    static GUID: OnceLock<Regex> = OnceLock::new();
    let re = GUID.get_or_init(|| {
        Regex::new(r"^\{[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\}$")
            .expect("GUID pattern is valid")
    });
    re.is_match(value)
}
