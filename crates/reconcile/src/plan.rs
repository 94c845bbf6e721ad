//! Plan computation.
//!
//! A plan is the ordered list of primitive operations that converges an
//! entity from its observed state to the desired state. Builders here
//! guarantee the ordering rules: create comes first, a rename is applied
//! before any relocation (so lookups during relocation use the final name),
//! attribute updates before path edits, file staging last, and deletion is
//! always a single-operation plan.

use crate::attrs::{AttrMap, changed_attrs};
use crate::edit::ListEdit;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;

/// A primitive mutating operation against one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Create the entity under its first logical folder
    Create {
        name: String,
        folder: String,
        attrs: AttrMap,
    },
    /// Rename the entity
    Rename { to: String },
    /// Overwrite the given attributes
    SetAttrs { attrs: AttrMap },
    /// Add the entity to a logical folder
    Link { folder: String },
    /// Remove the entity from a logical folder
    Unlink { folder: String },
    /// Copy the file payload from a source directory
    StageFiles { source: PathBuf },
    /// Remove the entity everywhere
    Delete,
}

/// An ordered operation list for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub ops: Vec<Op>,
}

impl Plan {
    /// Whether applying this plan would change anything.
    pub fn changed(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The observed state of an existing entity, as needed for planning.
#[derive(Debug, Clone, Copy)]
pub struct Observed<'a> {
    pub name: &'a str,
    pub attrs: &'a AttrMap,
    pub paths: &'a [String],
}

/// Plan the creation of an entity.
///
/// `paths` is the full logical path list the entity should end up with;
/// the first element hosts the create itself and the rest become links.
/// Create bags carry creation defaults, so unlike updates they may include
/// fields the request never mentioned.
pub fn plan_create(
    name: &str,
    paths: &[String],
    attrs: AttrMap,
    files: Option<PathBuf>,
) -> Result<Plan> {
    let Some((first, rest)) = paths.split_first() else {
        return Err(Error::conflict(
            "an entity must be created with at least one path",
        ));
    };

    let mut ops = vec![Op::Create {
        name: name.to_string(),
        folder: first.clone(),
        attrs,
    }];
    for folder in rest {
        ops.push(Op::Link {
            folder: folder.clone(),
        });
    }
    if let Some(source) = files {
        ops.push(Op::StageFiles { source });
    }
    Ok(Plan { ops })
}

/// Plan the update of an existing entity.
///
/// Only explicitly supplied attributes diff against the observed bag. A
/// path edit that would leave the entity without any logical path is a
/// conflict; the caller must request deletion instead. When the plan both
/// renames and relocates, the rename op is emitted first.
pub fn plan_update(
    current: Observed<'_>,
    rename_to: Option<&str>,
    desired: &AttrMap,
    path_edit: Option<&ListEdit<String>>,
    stage_from: Option<PathBuf>,
) -> Result<Plan> {
    let mut ops = Vec::new();

    if let Some(to) = rename_to
        && to != current.name
    {
        ops.push(Op::Rename { to: to.to_string() });
    }

    let attr_changes = changed_attrs(current.attrs, desired);
    if !attr_changes.is_empty() {
        ops.push(Op::SetAttrs {
            attrs: attr_changes,
        });
    }

    if let Some(edit) = path_edit {
        let target = edit.resolve(current.paths);
        if target.is_empty() {
            return Err(Error::conflict(
                "removing these paths would leave the entity without any path; \
                 use state: absent to remove the entity",
            ));
        }
        for folder in &target {
            if !current.paths.contains(folder) {
                ops.push(Op::Link {
                    folder: folder.clone(),
                });
            }
        }
        for folder in current.paths {
            if !target.contains(folder) {
                ops.push(Op::Unlink {
                    folder: folder.clone(),
                });
            }
        }
    }

    if let Some(source) = stage_from {
        ops.push(Op::StageFiles { source });
    }

    Ok(Plan { ops })
}

/// Plan the deletion of an entity.
///
/// Deleting an entity that does not exist is a no-op plan.
pub fn plan_delete(exists: bool) -> Plan {
    if exists {
        Plan {
            ops: vec![Op::Delete],
        }
    } else {
        Plan::default()
    }
}
