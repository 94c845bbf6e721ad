//! Desired state and run mode types.

use serde::{Deserialize, Serialize};

/// The state a request wants an entity to be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The entity should exist and match the supplied options
    #[default]
    Present,
    /// The entity should not exist
    Absent,
}

impl DesiredState {
    /// Check if the request wants the entity to exist.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Check if the request wants the entity removed.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Whether an invocation applies its plan or only reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Apply the computed plan against the external system
    #[default]
    Apply,
    /// Compute and report the plan without performing any mutation
    Check,
}

impl RunMode {
    /// Check if this is a dry run.
    pub fn is_check(&self) -> bool {
        matches!(self, Self::Check)
    }
}
