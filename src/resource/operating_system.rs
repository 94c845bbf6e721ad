//! Operating system reconciliation.
//!
//! An operating system is imported either from full installation media
//! (`source`, a directory whose `sources` subdirectory holds the
//! install.wim) or from a bare WIM file (`wim`). The image within the WIM
//! is selected by exactly one of index, name, or edition ID.

use super::{
    ItemOutcome, ItemRequest, converge_item, expand_path, forbid_for_absent, share_path_edit,
};
use mdtkit::{Backend, EntityKind, EntityRecord, FileDigest};
use reconcile::{
    AttrMap, AttrValue, DesiredState, EntityRef, Error, ListSpec, Report, Result, RunMode,
    supplied,
};
use serde::{Deserialize, Serialize};

/// The type of operating system import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    /// Full installation media directory
    Source,
    /// A single WIM file
    Wim,
}

impl OsType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Wim => "wim",
        }
    }
}

/// Options for one operating-system request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatingSystemOptions {
    pub guid: Option<String>,
    pub name: Option<String>,
    pub paths: Option<ListSpec<String>>,
    #[serde(rename = "type")]
    pub os_type: Option<OsType>,
    pub source_path: Option<String>,
    pub destination_folder: Option<String>,
    pub image_index: Option<i64>,
    pub image_name: Option<String>,
    pub image_edition_id: Option<String>,
    pub comments: Option<String>,
    pub enabled: Option<bool>,
    pub hidden: Option<bool>,
    #[serde(default)]
    pub state: DesiredState,
}

/// The reported state of an operating system.
#[derive(Debug, Clone, Serialize)]
pub struct OperatingSystemSnapshot {
    pub guid: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_edition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub comments: String,
    pub enabled: bool,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileDigest>>,
}

/// Reconcile an operating system against the share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &OperatingSystemOptions,
    mode: RunMode,
) -> Result<Report<OperatingSystemSnapshot>> {
    validate(opts)?;

    let target = EntityRef::new(opts.guid.clone(), effective_name(opts));
    let rename_to = match (&opts.guid, &opts.name) {
        (Some(_), Some(name)) => Some(name.clone()),
        _ => None,
    };
    let path_edit = match opts.paths.clone() {
        Some(spec) => spec.into_edit("paths")?,
        None => None,
    };
    let source = opts.source_path.as_deref().map(expand_path);

    let request = ItemRequest {
        kind: EntityKind::OperatingSystem,
        state: opts.state,
        create_name: effective_name(opts),
        create_attrs: create_attrs(opts),
        update_attrs: update_attrs(opts),
        path_edit: share_path_edit(EntityKind::OperatingSystem, path_edit),
        source,
    };

    let outcome = converge_item(backend, &target, rename_to, request, mode)?;
    Ok(into_report(outcome))
}

/// Build a snapshot from a fetched record.
pub fn snapshot(record: &EntityRecord) -> OperatingSystemSnapshot {
    from_record(record, None)
}

fn validate(opts: &OperatingSystemOptions) -> Result<()> {
    match opts.state {
        DesiredState::Absent => forbid_for_absent(&[
            ("type", opts.os_type.is_some()),
            ("paths", opts.paths.is_some()),
            ("source_path", opts.source_path.is_some()),
            ("destination_folder", opts.destination_folder.is_some()),
            ("image_index", opts.image_index.is_some()),
            ("image_name", opts.image_name.is_some()),
            ("image_edition_id", opts.image_edition_id.is_some()),
            ("comments", opts.comments.is_some()),
            ("enabled", opts.enabled.is_some()),
            ("hidden", opts.hidden.is_some()),
        ]),
        DesiredState::Present => {
            if opts.os_type.is_none() {
                return Err(Error::validation("type is required when state is present"));
            }
            if opts.source_path.is_none() {
                return Err(Error::validation(
                    "source_path is required when state is present",
                ));
            }
            if opts.destination_folder.is_none() {
                return Err(Error::validation(
                    "destination_folder is required when state is present",
                ));
            }
            let selectors = [
                opts.image_index.is_some(),
                opts.image_name.is_some(),
                opts.image_edition_id.is_some(),
            ]
            .iter()
            .filter(|given| **given)
            .count();
            if selectors != 1 {
                return Err(Error::validation(
                    "exactly one of image_index, image_name or image_edition_id is required",
                ));
            }
            Ok(())
        }
    }
}

/// The name the request addresses: explicit, or derived from the image
/// selector, destination folder, and source file name.
fn effective_name(opts: &OperatingSystemOptions) -> Option<String> {
    if opts.name.is_some() {
        return opts.name.clone();
    }
    let selector = opts
        .image_name
        .clone()
        .or_else(|| opts.image_edition_id.clone())
        .or_else(|| opts.image_index.map(|i| format!("index {i}")))?;
    let destination = opts.destination_folder.as_deref()?;
    let file = opts
        .source_path
        .as_deref()
        .map(|p| match opts.os_type {
            Some(OsType::Wim) => expand_path(p)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            _ => "install.wim".to_string(),
        })
        .unwrap_or_default();
    Some(format!("{selector} in {destination} {file}"))
}

fn files_path(opts: &OperatingSystemOptions) -> Option<String> {
    opts.destination_folder
        .as_deref()
        .map(|folder| format!(".\\Operating Systems\\{folder}"))
}

fn create_attrs(opts: &OperatingSystemOptions) -> AttrMap {
    supplied([
        (
            "Type",
            opts.os_type.map(|t| AttrValue::from(t.as_str())),
        ),
        ("Source", files_path(opts).map(AttrValue::from)),
        (
            "DestinationFolder",
            opts.destination_folder.clone().map(AttrValue::from),
        ),
        ("ImageIndex", opts.image_index.map(AttrValue::from)),
        ("ImageName", opts.image_name.clone().map(AttrValue::from)),
        (
            "ImageEditionId",
            opts.image_edition_id.clone().map(AttrValue::from),
        ),
        (
            "Comments",
            Some(opts.comments.clone().unwrap_or_default().into()),
        ),
        ("enable", Some(opts.enabled.unwrap_or(true).into())),
        ("hide", Some(opts.hidden.unwrap_or(false).into())),
    ])
}

fn update_attrs(opts: &OperatingSystemOptions) -> AttrMap {
    supplied([
        (
            "Type",
            opts.os_type.map(|t| AttrValue::from(t.as_str())),
        ),
        ("ImageIndex", opts.image_index.map(AttrValue::from)),
        ("ImageName", opts.image_name.clone().map(AttrValue::from)),
        (
            "ImageEditionId",
            opts.image_edition_id.clone().map(AttrValue::from),
        ),
        ("Comments", opts.comments.clone().map(AttrValue::from)),
        ("enable", opts.enabled.map(AttrValue::from)),
        ("hide", opts.hidden.map(AttrValue::from)),
    ])
}

fn into_report(outcome: ItemOutcome) -> Report<OperatingSystemSnapshot> {
    let ItemOutcome {
        changed,
        record,
        files,
        diagnostics,
    } = outcome;
    let mut report = Report {
        changed,
        entity: record.map(|r| from_record(&r, files)),
        diagnostics: Vec::new(),
    };
    for note in diagnostics {
        report = report.with_diagnostic(note);
    }
    report
}

fn from_record(record: &EntityRecord, files: Option<Vec<FileDigest>>) -> OperatingSystemSnapshot {
    OperatingSystemSnapshot {
        guid: record.guid.clone(),
        name: record.name.clone(),
        os_type: record.attr_str("Type").map(str::to_string),
        paths: record.paths.clone(),
        files_path: record.attr_str("Source").map(str::to_string),
        image_index: record.attr_int("ImageIndex"),
        image_name: record.attr_str("ImageName").map(str::to_string),
        image_edition_id: record.attr_str("ImageEditionId").map(str::to_string),
        build: record.attr_str("Build").map(str::to_string),
        platform: record.attr_str("Platform").map(str::to_string),
        size: record.attr_int("Size"),
        comments: record.attr_str("Comments").unwrap_or_default().to_string(),
        enabled: record.attr_bool("enable").unwrap_or(true),
        hidden: record.attr_bool("hide").unwrap_or(false),
        files,
    }
}
