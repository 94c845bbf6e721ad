//! Selection profile reconciliation.
//!
//! A selection profile is a named set of share folder paths. The
//! definition list reconciles with the same add/remove/set semantics as
//! logical paths, but it lives in the profile's attribute bag rather than
//! in the folder tree, so edits become a single attribute write.

use super::{ItemOutcome, ItemRequest, converge_item, forbid_for_absent};
use mdtkit::{Backend, EntityKind, EntityRecord};
use reconcile::{
    AttrMap, AttrValue, DesiredState, EntityRef, Error, ListSpec, Report, Result, RunMode,
    supplied,
};
use serde::{Deserialize, Serialize};

/// Options for one selection-profile request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionProfileOptions {
    pub guid: Option<String>,
    pub name: Option<String>,
    pub definition_paths: Option<ListSpec<String>>,
    pub comments: Option<String>,
    pub enabled: Option<bool>,
    pub hidden: Option<bool>,
    #[serde(default)]
    pub state: DesiredState,
}

/// The reported state of a selection profile.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionProfileSnapshot {
    pub guid: String,
    pub name: String,
    pub read_only: bool,
    pub definition: Vec<String>,
    pub comments: String,
    pub enabled: bool,
    pub hidden: bool,
}

/// Reconcile a selection profile against the share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &SelectionProfileOptions,
    mode: RunMode,
) -> Result<Report<SelectionProfileSnapshot>> {
    validate(opts)?;

    let target = EntityRef::new(opts.guid.clone(), opts.name.clone());
    let rename_to = target.rename_target().map(str::to_string);

    let edit = match opts.definition_paths.clone() {
        Some(spec) => spec.into_edit("definition_paths")?,
        None => None,
    };

    // The definition is list-valued but attribute-backed: resolve the edit
    // against the current definition and diff the result as an attribute.
    let current = if opts.state.is_present() {
        reconcile::resolve(
            &target,
            |guid| backend.find_by_guid(EntityKind::SelectionProfile, guid),
            |name| backend.find_by_name(EntityKind::SelectionProfile, name),
        )?
    } else {
        None
    };
    let definition = edit.as_ref().map(|edit| {
        let existing = current
            .as_ref()
            .and_then(|r| r.attr_list("Definition"))
            .unwrap_or(&[]);
        edit.resolve(existing)
    });

    let request = ItemRequest {
        kind: EntityKind::SelectionProfile,
        state: opts.state,
        create_name: opts.name.clone(),
        create_attrs: create_attrs(opts, definition.clone()),
        update_attrs: update_attrs(opts, definition),
        path_edit: None,
        source: None,
    };

    let outcome = converge_item(backend, &target, rename_to, request, mode)?;
    Ok(into_report(outcome))
}

/// Build a snapshot from a fetched record.
pub fn snapshot(record: &EntityRecord) -> SelectionProfileSnapshot {
    from_record(record)
}

fn validate(opts: &SelectionProfileOptions) -> Result<()> {
    match opts.state {
        DesiredState::Absent => forbid_for_absent(&[
            ("definition_paths", opts.definition_paths.is_some()),
            ("comments", opts.comments.is_some()),
            ("enabled", opts.enabled.is_some()),
            ("hidden", opts.hidden.is_some()),
        ]),
        DesiredState::Present => {
            if opts.name.is_none() {
                return Err(Error::validation("name is required when state is present"));
            }
            let Some(spec) = &opts.definition_paths else {
                return Err(Error::validation(
                    "definition_paths is required when state is present",
                ));
            };
            if spec.add.as_ref().is_some_and(Vec::is_empty) {
                return Err(Error::validation(
                    "definition_paths.add must not be an empty list",
                ));
            }
            if spec.remove.as_ref().is_some_and(Vec::is_empty) {
                return Err(Error::validation(
                    "definition_paths.remove must not be an empty list",
                ));
            }
            Ok(())
        }
    }
}

fn create_attrs(
    opts: &SelectionProfileOptions,
    definition: Option<Vec<String>>,
) -> AttrMap {
    supplied([
        (
            "Definition",
            Some(AttrValue::List(definition.unwrap_or_default())),
        ),
        ("ReadOnly", Some(false.into())),
        (
            "Comments",
            Some(opts.comments.clone().unwrap_or_default().into()),
        ),
        ("enable", Some(opts.enabled.unwrap_or(true).into())),
        ("hide", Some(opts.hidden.unwrap_or(false).into())),
    ])
}

fn update_attrs(
    opts: &SelectionProfileOptions,
    definition: Option<Vec<String>>,
) -> AttrMap {
    supplied([
        ("Definition", definition.map(AttrValue::List)),
        ("Comments", opts.comments.clone().map(AttrValue::from)),
        ("enable", opts.enabled.map(AttrValue::from)),
        ("hide", opts.hidden.map(AttrValue::from)),
    ])
}

fn into_report(outcome: ItemOutcome) -> Report<SelectionProfileSnapshot> {
    let ItemOutcome {
        changed,
        record,
        diagnostics,
        ..
    } = outcome;
    let mut report = Report {
        changed,
        entity: record.map(|r| from_record(&r)),
        diagnostics: Vec::new(),
    };
    for note in diagnostics {
        report = report.with_diagnostic(note);
    }
    report
}

fn from_record(record: &EntityRecord) -> SelectionProfileSnapshot {
    SelectionProfileSnapshot {
        guid: record.guid.clone(),
        name: record.name.clone(),
        read_only: record.attr_bool("ReadOnly").unwrap_or(false),
        definition: record
            .attr_list("Definition")
            .map(<[String]>::to_vec)
            .unwrap_or_default(),
        comments: record.attr_str("Comments").unwrap_or_default().to_string(),
        enabled: record.attr_bool("enable").unwrap_or(true),
        hidden: record.attr_bool("hide").unwrap_or(false),
    }
}
