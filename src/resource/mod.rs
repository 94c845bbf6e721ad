//! Entity reconciliation modules.
//!
//! Every share entity is reconciled through the same protocol: validate
//! the request, resolve the target, fetch the current state, plan the
//! difference, apply the plan (or only report it in check mode), and
//! re-read the result. The per-kind modules own their option schemas,
//! validation rule tables, and snapshot shapes; [`converge_item`] and
//! [`converge_resolved`] carry the shared protocol so the modules stay
//! declarative.

pub mod application;
pub mod dependency;
pub mod deployment_share;
pub mod directory;
pub mod driver_import;
pub mod operating_system;
pub mod selection_profile;
pub mod task_sequence;

use mdtkit::{Backend, EntityKind, EntityOps, EntityRecord, FileDigest};
use reconcile::{
    AttrMap, DesiredState, EntityRef, Error, ListEdit, Op, Plan, Result, RunMode, execute,
    plan_create, plan_delete, plan_update,
};
use std::path::PathBuf;

/// One entity request after per-kind validation, reduced to what the
/// shared protocol needs.
pub(crate) struct ItemRequest {
    pub kind: EntityKind,
    pub state: DesiredState,
    /// Name to create under, when the request targets a missing entity.
    /// `None` makes creation a validation failure.
    pub create_name: Option<String>,
    /// Attribute bag for creation, including creation defaults
    pub create_attrs: AttrMap,
    /// Only the attributes the request explicitly supplied
    pub update_attrs: AttrMap,
    /// Logical folder edit, with folders already share-absolute
    pub path_edit: Option<ListEdit<String>>,
    /// File payload source for file-backed kinds
    pub source: Option<PathBuf>,
}

/// What one reconciliation did (or, in check mode, would do).
pub(crate) struct ItemOutcome {
    pub changed: bool,
    /// Post-state record; pre-state when nothing changed; `None` after a
    /// deletion or an absent no-op
    pub record: Option<EntityRecord>,
    /// Digests of the requested file payload, when one was supplied
    pub files: Option<Vec<FileDigest>>,
    pub diagnostics: Vec<String>,
}

/// Reconcile an entity addressed by GUID or name.
///
/// `rename_to` is the explicitly requested name when the GUID is the
/// lookup key; kinds whose creation name can be derived must not pass the
/// derived name here, or a GUID-addressed update would rename the entity
/// as a side effect.
pub(crate) fn converge_item<B: Backend + ?Sized>(
    backend: &mut B,
    target: &EntityRef,
    rename_to: Option<String>,
    request: ItemRequest,
    mode: RunMode,
) -> Result<ItemOutcome> {
    target.validate_for(request.state)?;
    let current = reconcile::resolve(
        target,
        |guid| backend.find_by_guid(request.kind, guid),
        |name| backend.find_by_name(request.kind, name),
    )?;
    converge_resolved(backend, request, current, rename_to, mode)
}

/// Reconcile an entity the caller already resolved.
///
/// Task sequences resolve by their human-assigned ID rather than a GUID,
/// so their module runs its own lookup and enters the protocol here.
pub(crate) fn converge_resolved<B: Backend + ?Sized>(
    backend: &mut B,
    request: ItemRequest,
    current: Option<EntityRecord>,
    rename_to: Option<String>,
    mode: RunMode,
) -> Result<ItemOutcome> {
    match (request.state, current) {
        (DesiredState::Absent, None) => Ok(ItemOutcome {
            changed: false,
            record: None,
            files: None,
            diagnostics: Vec::new(),
        }),

        (DesiredState::Absent, Some(record)) => {
            if mode.is_check() {
                return Ok(ItemOutcome {
                    changed: true,
                    record: None,
                    files: None,
                    diagnostics: Vec::new(),
                });
            }
            let plan = plan_delete(true);
            let mut sink = EntityOps::new(backend, request.kind, Some(record.guid.clone()));
            let applied = execute(&plan, mode, &mut sink);
            finish(applied, None, None)
        }

        (DesiredState::Present, None) => {
            let name = request.create_name.clone().ok_or_else(|| {
                Error::validation(format!(
                    "a name is required to create a {}",
                    request.kind.label()
                ))
            })?;
            let paths = create_paths(request.kind, request.path_edit.as_ref())?;
            let plan = plan_create(
                &name,
                &paths,
                request.create_attrs.clone(),
                request.source.clone(),
            )?;

            let files = digest_payload(&request)?;
            if mode.is_check() {
                return Ok(ItemOutcome {
                    changed: true,
                    record: Some(project(None, &name, &plan)),
                    files,
                    diagnostics: Vec::new(),
                });
            }

            let mut sink = EntityOps::new(backend, request.kind, None);
            let applied = execute(&plan, mode, &mut sink);
            let guid = sink.guid().map(str::to_string);
            let record = match &guid {
                Some(guid) => backend.find_by_guid(request.kind, guid)?,
                None => None,
            };
            finish(applied, record, files)
        }

        (DesiredState::Present, Some(record)) => {
            let stage_from = match &request.source {
                Some(source) => {
                    let desired = mdtkit::digest_tree(source)?;
                    let staged = backend.staged_files(request.kind, &record.guid)?;
                    (desired != staged).then(|| source.clone())
                }
                None => None,
            };
            let plan = plan_update(
                record.observed(),
                rename_to.as_deref(),
                &request.update_attrs,
                request.path_edit.as_ref(),
                stage_from,
            )?;

            let files = digest_payload(&request)?;
            if mode.is_check() {
                let projected = project(Some(&record), &record.name, &plan);
                return Ok(ItemOutcome {
                    changed: plan.changed(),
                    record: Some(projected),
                    files,
                    diagnostics: Vec::new(),
                });
            }
            if plan.is_empty() {
                return Ok(ItemOutcome {
                    changed: false,
                    record: Some(record),
                    files,
                    diagnostics: Vec::new(),
                });
            }

            let guid = record.guid.clone();
            let mut sink = EntityOps::new(backend, request.kind, Some(guid.clone()));
            let applied = execute(&plan, mode, &mut sink);
            let refreshed = backend.find_by_guid(request.kind, &guid)?;
            finish(applied, refreshed, files)
        }
    }
}

/// Convert an execution result into an outcome, surfacing a failure with a
/// note about how far the run got.
fn finish(
    applied: reconcile::Applied,
    record: Option<EntityRecord>,
    files: Option<Vec<FileDigest>>,
) -> Result<ItemOutcome> {
    if let Some(failure) = applied.failure {
        let note = format!(
            "{} of {} operations were applied before the failure; the share may be partially updated",
            applied.performed, applied.total
        );
        return Err(match failure {
            Error::Backend { message } => Error::backend(format!("{message} ({note})")),
            other => other,
        });
    }
    Ok(ItemOutcome {
        changed: applied.performed > 0,
        record,
        files,
        diagnostics: Vec::new(),
    })
}

/// The logical folders a new entity should be created with.
fn create_paths(kind: EntityKind, edit: Option<&ListEdit<String>>) -> Result<Vec<String>> {
    let default = vec![kind.root_folder().to_string()];
    let Some(edit) = edit else {
        return Ok(default);
    };
    let resolved = edit.resolve(&default);
    if resolved.is_empty() {
        return Err(Error::conflict(
            "the requested path edit would create the entity without any path",
        ));
    }
    Ok(resolved)
}

/// Digest the requested file payload, if the request carried one.
fn digest_payload(request: &ItemRequest) -> Result<Option<Vec<FileDigest>>> {
    request
        .source
        .as_deref()
        .map(mdtkit::digest_tree)
        .transpose()
}

/// Project the record a plan would produce, for check-mode reporting.
///
/// A projected create has no GUID yet; the backend generates one on the
/// live run.
fn project(current: Option<&EntityRecord>, name: &str, plan: &Plan) -> EntityRecord {
    let mut record = current.cloned().unwrap_or_else(|| EntityRecord {
        guid: String::new(),
        name: name.to_string(),
        attrs: AttrMap::new(),
        paths: Vec::new(),
    });

    for op in &plan.ops {
        match op {
            Op::Create {
                name,
                folder,
                attrs,
            } => {
                record.name = name.clone();
                record.attrs = attrs.clone();
                record.paths = vec![folder.clone()];
            }
            Op::Rename { to } => record.name = to.clone(),
            Op::SetAttrs { attrs } => {
                for (key, value) in attrs {
                    record.attrs.insert(key.clone(), value.clone());
                }
            }
            Op::Link { folder } => {
                if !record.paths.contains(folder) {
                    record.paths.push(folder.clone());
                }
            }
            Op::Unlink { folder } => record.paths.retain(|p| p != folder),
            Op::StageFiles { .. } | Op::Delete => {}
        }
    }
    record
}

/// Make a request path absolute within the share, under the kind's root
/// folder. An empty path means the root folder itself.
pub(crate) fn share_folder(kind: EntityKind, relative: &str) -> String {
    let trimmed = relative.trim_matches('\\');
    if trimmed.is_empty() {
        kind.root_folder().to_string()
    } else {
        format!("{}\\{}", kind.root_folder(), trimmed)
    }
}

/// Normalize a path edit so every folder is share-absolute.
pub(crate) fn share_path_edit(
    kind: EntityKind,
    edit: Option<ListEdit<String>>,
) -> Option<ListEdit<String>> {
    let absolute = |items: Vec<String>| {
        items
            .into_iter()
            .map(|p| share_folder(kind, &p))
            .collect::<Vec<_>>()
    };
    edit.map(|edit| match edit {
        ListEdit::Set(items) => ListEdit::Set(absolute(items)),
        ListEdit::Add(items) => ListEdit::Add(absolute(items)),
        ListEdit::Remove(items) => ListEdit::Remove(absolute(items)),
    })
}

/// Reject options that must be empty for `state: absent`.
///
/// `supplied` pairs each option name with whether the request set it.
pub(crate) fn forbid_for_absent(supplied: &[(&str, bool)]) -> Result<()> {
    let offending: Vec<&str> = supplied
        .iter()
        .filter(|(_, given)| *given)
        .map(|(name, _)| *name)
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} must not be provided when state is absent",
            offending.join(", ")
        )))
    }
}

/// Expand `~` in a user-supplied filesystem path.
pub(crate) fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_folder_normalization() {
        assert_eq!(
            share_folder(EntityKind::Application, "Win11"),
            "Applications\\Win11"
        );
        assert_eq!(share_folder(EntityKind::Application, ""), "Applications");
        assert_eq!(
            share_folder(EntityKind::TaskSequence, "\\Site 1\\"),
            "Task Sequences\\Site 1"
        );
    }

    #[test]
    fn test_forbid_for_absent_names_offenders() {
        let err = forbid_for_absent(&[("type", true), ("comments", false), ("enabled", true)])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("type"));
        assert!(message.contains("enabled"));
        assert!(!message.contains("comments"));

        assert!(forbid_for_absent(&[("type", false)]).is_ok());
    }

    #[test]
    fn test_create_paths_defaults_to_root() {
        let paths = create_paths(EntityKind::Application, None).unwrap();
        assert_eq!(paths, vec!["Applications"]);
    }

    #[test]
    fn test_create_paths_removing_root_is_conflict() {
        let edit = ListEdit::Remove(vec!["Applications".to_string()]);
        assert!(create_paths(EntityKind::Application, Some(&edit)).is_err());
    }
}
