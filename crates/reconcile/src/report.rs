//! Structured reconciliation results.

use serde::Serialize;

/// The outcome of reconciling one entity.
///
/// `entity` is the post-state snapshot, or the pre-state when nothing
/// changed; it is absent after a deletion. Diagnostics carry human-readable
/// notes such as partial-application warnings.
#[derive(Debug, Clone, Serialize)]
pub struct Report<S> {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<S>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl<S> Report<S> {
    /// A run that changed the entity, with its resulting snapshot.
    pub fn changed(entity: S) -> Self {
        Self {
            changed: true,
            entity: Some(entity),
            diagnostics: Vec::new(),
        }
    }

    /// A run that found the entity already in the desired state.
    pub fn unchanged(entity: S) -> Self {
        Self {
            changed: false,
            entity: Some(entity),
            diagnostics: Vec::new(),
        }
    }

    /// A run that deleted the entity, or found nothing to delete.
    pub fn removed(changed: bool) -> Self {
        Self {
            changed,
            entity: None,
            diagnostics: Vec::new(),
        }
    }

    /// Attach a diagnostic note.
    pub fn with_diagnostic(mut self, note: impl Into<String>) -> Self {
        self.diagnostics.push(note.into());
        self
    }

    /// Map the snapshot type.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Report<T> {
        Report {
            changed: self.changed,
            entity: self.entity.map(f),
            diagnostics: self.diagnostics,
        }
    }
}
