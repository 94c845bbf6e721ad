//! Application reconciliation.
//!
//! Applications come in three flavors: `source` applications carry a file
//! payload staged into the share, `no_source` applications only carry a
//! command line, and `bundle` applications are containers for dependencies
//! with neither. The full name is derived from publisher, short name and
//! version when the request does not name the application explicitly.

use super::{
    ItemOutcome, ItemRequest, converge_item, expand_path, forbid_for_absent, share_path_edit,
};
use mdtkit::{Backend, EntityKind, EntityRecord, FileDigest};
use reconcile::{
    AttrMap, AttrValue, DesiredState, EntityRef, Error, ListSpec, Report, Result, RunMode,
    supplied,
};
use serde::{Deserialize, Serialize};

/// The type of application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    /// Installer files staged into the share
    Source,
    /// Command line only, files live elsewhere
    NoSource,
    /// Container for dependent applications
    Bundle,
}

impl AppType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::NoSource => "no_source",
            Self::Bundle => "bundle",
        }
    }
}

/// Options for one application request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationOptions {
    pub guid: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub app_type: Option<AppType>,
    pub paths: Option<ListSpec<String>>,
    pub publisher: Option<String>,
    pub short_name: Option<String>,
    pub version: Option<String>,
    pub language: Option<String>,
    pub command_line: Option<String>,
    pub working_directory: Option<String>,
    pub source_path: Option<String>,
    pub destination_folder: Option<String>,
    pub comments: Option<String>,
    pub enabled: Option<bool>,
    pub hidden: Option<bool>,
    pub reboot: Option<bool>,
    #[serde(default)]
    pub state: DesiredState,
}

/// The reported state of an application.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSnapshot {
    pub guid: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
    pub publisher: String,
    pub short_name: String,
    pub version: String,
    pub language: String,
    pub comments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    pub enabled: bool,
    pub hidden: bool,
    pub reboot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_path: Option<String>,
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileDigest>>,
}

/// Reconcile an application against the share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &ApplicationOptions,
    mode: RunMode,
) -> Result<Report<ApplicationSnapshot>> {
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
    let source = opts
        .source_path
        .as_deref()
        .map(expand_path)
        .filter(|_| opts.app_type == Some(AppType::Source));

    let request = ItemRequest {
        kind: EntityKind::Application,
        state: opts.state,
        create_name: effective_name(opts),
        create_attrs: create_attrs(opts),
        update_attrs: update_attrs(opts),
        path_edit: share_path_edit(EntityKind::Application, path_edit),
        source,
    };

    let outcome = converge_item(backend, &target, rename_to, request, mode)?;
    Ok(into_report(outcome))
}

/// Read the current state of applications without mutating anything.
pub fn snapshot(record: &EntityRecord) -> ApplicationSnapshot {
    from_record(record, None)
}

fn validate(opts: &ApplicationOptions) -> Result<()> {
    match opts.state {
        DesiredState::Absent => forbid_for_absent(&[
            ("type", opts.app_type.is_some()),
            ("paths", opts.paths.is_some()),
            ("publisher", opts.publisher.is_some()),
            ("short_name", opts.short_name.is_some()),
            ("version", opts.version.is_some()),
            ("language", opts.language.is_some()),
            ("command_line", opts.command_line.is_some()),
            ("working_directory", opts.working_directory.is_some()),
            ("source_path", opts.source_path.is_some()),
            ("destination_folder", opts.destination_folder.is_some()),
            ("comments", opts.comments.is_some()),
            ("enabled", opts.enabled.is_some()),
            ("hidden", opts.hidden.is_some()),
            ("reboot", opts.reboot.is_some()),
        ]),
        DesiredState::Present => {
            let app_type = opts
                .app_type
                .ok_or_else(|| Error::validation("type is required when state is present"))?;
            if opts.short_name.is_none() {
                return Err(Error::validation(
                    "short_name is required when state is present",
                ));
            }
            match app_type {
                AppType::Source | AppType::NoSource => {
                    if opts.command_line.is_none() {
                        return Err(Error::validation(format!(
                            "command_line is required for {} applications",
                            app_type.as_str()
                        )));
                    }
                }
                AppType::Bundle => {
                    forbid_for_type("bundle", &[
                        ("command_line", opts.command_line.is_some()),
                        ("working_directory", opts.working_directory.is_some()),
                        ("source_path", opts.source_path.is_some()),
                        ("destination_folder", opts.destination_folder.is_some()),
                    ])?;
                }
            }
            match app_type {
                AppType::Source => {
                    if opts.source_path.is_none() {
                        return Err(Error::validation(
                            "source_path is required for source applications",
                        ));
                    }
                }
                AppType::NoSource => {
                    forbid_for_type("no_source", &[
                        ("source_path", opts.source_path.is_some()),
                        ("destination_folder", opts.destination_folder.is_some()),
                    ])?;
                }
                AppType::Bundle => {}
            }
            Ok(())
        }
    }
}

fn forbid_for_type(app_type: &str, supplied: &[(&str, bool)]) -> Result<()> {
    for (name, given) in supplied {
        if *given {
            return Err(Error::validation(format!(
                "{name} must not be provided for {app_type} applications"
            )));
        }
    }
    Ok(())
}

/// The full name the request addresses: explicit, or derived from
/// publisher, short name and version.
fn effective_name(opts: &ApplicationOptions) -> Option<String> {
    if opts.name.is_some() {
        return opts.name.clone();
    }
    let derived = [
        opts.publisher.as_deref(),
        opts.short_name.as_deref(),
        opts.version.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ");
    (!derived.is_empty()).then_some(derived)
}

/// Physical payload location within the share.
fn files_path(opts: &ApplicationOptions) -> Option<String> {
    if opts.app_type != Some(AppType::Source) {
        return None;
    }
    let folder = opts
        .destination_folder
        .clone()
        .or_else(|| effective_name(opts))?;
    Some(format!(".\\Applications\\{folder}"))
}

fn create_attrs(opts: &ApplicationOptions) -> AttrMap {
    let files = files_path(opts);
    let working_directory = opts.working_directory.clone().or_else(|| files.clone());
    let app_type = opts.app_type.map(|t| t.as_str());

    supplied([
        ("Type", app_type.map(AttrValue::from)),
        (
            "Publisher",
            Some(opts.publisher.clone().unwrap_or_default().into()),
        ),
        (
            "ShortName",
            opts.short_name.clone().map(AttrValue::from),
        ),
        (
            "Version",
            Some(opts.version.clone().unwrap_or_default().into()),
        ),
        (
            "Language",
            Some(opts.language.clone().unwrap_or_default().into()),
        ),
        (
            "Comments",
            Some(opts.comments.clone().unwrap_or_default().into()),
        ),
        ("CommandLine", opts.command_line.clone().map(AttrValue::from)),
        (
            "WorkingDirectory",
            working_directory.map(AttrValue::from),
        ),
        ("Source", files.clone().map(AttrValue::from)),
        (
            "DestinationFolder",
            opts.destination_folder
                .clone()
                .or_else(|| files.is_some().then(|| effective_name(opts)).flatten())
                .map(AttrValue::from),
        ),
        ("enable", Some(opts.enabled.unwrap_or(true).into())),
        ("hide", Some(opts.hidden.unwrap_or(false).into())),
        ("Reboot", Some(opts.reboot.unwrap_or(false).into())),
    ])
}

fn update_attrs(opts: &ApplicationOptions) -> AttrMap {
    supplied([
        (
            "Type",
            opts.app_type.map(|t| AttrValue::from(t.as_str())),
        ),
        ("Publisher", opts.publisher.clone().map(AttrValue::from)),
        ("ShortName", opts.short_name.clone().map(AttrValue::from)),
        ("Version", opts.version.clone().map(AttrValue::from)),
        ("Language", opts.language.clone().map(AttrValue::from)),
        ("Comments", opts.comments.clone().map(AttrValue::from)),
        ("CommandLine", opts.command_line.clone().map(AttrValue::from)),
        (
            "WorkingDirectory",
            opts.working_directory.clone().map(AttrValue::from),
        ),
        (
            "Source",
            opts.destination_folder
                .as_ref()
                .and(files_path(opts))
                .map(AttrValue::from),
        ),
        ("enable", opts.enabled.map(AttrValue::from)),
        ("hide", opts.hidden.map(AttrValue::from)),
        ("Reboot", opts.reboot.map(AttrValue::from)),
    ])
}

fn into_report(outcome: ItemOutcome) -> Report<ApplicationSnapshot> {
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

fn from_record(record: &EntityRecord, files: Option<Vec<FileDigest>>) -> ApplicationSnapshot {
    ApplicationSnapshot {
        guid: record.guid.clone(),
        name: record.name.clone(),
        app_type: record.attr_str("Type").map(str::to_string),
        publisher: record.attr_str("Publisher").unwrap_or_default().to_string(),
        short_name: record.attr_str("ShortName").unwrap_or_default().to_string(),
        version: record.attr_str("Version").unwrap_or_default().to_string(),
        language: record.attr_str("Language").unwrap_or_default().to_string(),
        comments: record.attr_str("Comments").unwrap_or_default().to_string(),
        command_line: record.attr_str("CommandLine").map(str::to_string),
        working_directory: record.attr_str("WorkingDirectory").map(str::to_string),
        enabled: record.attr_bool("enable").unwrap_or(true),
        hidden: record.attr_bool("hide").unwrap_or(false),
        reboot: record.attr_bool("Reboot").unwrap_or(false),
        files_path: record.attr_str("Source").map(str::to_string),
        paths: record.paths.clone(),
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdtkit::MemoryBackend;

    fn no_source_opts() -> ApplicationOptions {
        ApplicationOptions {
            app_type: Some(AppType::NoSource),
            short_name: Some("7zip".into()),
            version: Some("24.09".into()),
            command_line: Some("7z.exe /S".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_derives_full_name() {
        let mut backend = MemoryBackend::new();
        let report = reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();

        assert!(report.changed);
        let snapshot = report.entity.unwrap();
        assert_eq!(snapshot.name, "7zip 24.09");
        assert_eq!(snapshot.short_name, "7zip");
        assert_eq!(snapshot.command_line.as_deref(), Some("7z.exe /S"));
        assert!(snapshot.enabled);
        assert!(!snapshot.hidden);
        assert_eq!(snapshot.paths, vec!["Applications"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut backend = MemoryBackend::new();
        let first = reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();
        let second = reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        let before = serde_json::to_value(first.entity.unwrap()).unwrap();
        let after = serde_json::to_value(second.entity.unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let mut backend = MemoryBackend::new();
        reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();
        let mutations_before = backend.mutations();

        let update = ApplicationOptions {
            comments: Some("updated".into()),
            ..no_source_opts()
        };
        let report = reconcile(&mut backend, &update, RunMode::Apply).unwrap();

        assert!(report.changed);
        // One SetAttrs call, nothing else.
        assert_eq!(backend.mutations(), mutations_before + 1);
        let snapshot = report.entity.unwrap();
        assert_eq!(snapshot.comments, "updated");
        assert!(snapshot.enabled);
        assert_eq!(snapshot.paths, vec!["Applications"]);
    }

    #[test]
    fn test_check_mode_predicts_without_mutating() {
        let mut backend = MemoryBackend::new();
        let check = reconcile(&mut backend, &no_source_opts(), RunMode::Check).unwrap();
        assert!(check.changed);
        assert_eq!(backend.mutations(), 0);
        assert_eq!(check.entity.unwrap().name, "7zip 24.09");

        // The live run agrees with the prediction.
        let live = reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();
        assert_eq!(live.changed, check.changed);
    }

    #[test]
    fn test_absent_on_missing_is_noop_without_calls() {
        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            name: Some("never existed".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!report.changed);
        assert!(report.entity.is_none());
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_absent_removes_existing() {
        let mut backend = MemoryBackend::new();
        reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();

        let opts = ApplicationOptions {
            name: Some("7zip 24.09".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
        assert!(
            backend
                .find_by_name(EntityKind::Application, "7zip 24.09")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_absent_with_guid_and_name_is_ambiguous() {
        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            guid: Some("{12345678-1234-1234-1234-123456789012}".into()),
            name: Some("7zip 24.09".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_absent_rejects_update_fields() {
        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            name: Some("7zip 24.09".into()),
            comments: Some("still here".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_bundle_rejects_command_line() {
        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            app_type: Some(AppType::Bundle),
            short_name: Some("suite".into()),
            command_line: Some("setup.exe".into()),
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_source_requires_source_path() {
        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            app_type: Some(AppType::Source),
            short_name: Some("7zip".into()),
            command_line: Some("7z.exe /S".into()),
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_rename_by_guid() {
        let mut backend = MemoryBackend::new();
        let created = reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();
        let guid = created.entity.unwrap().guid;

        let opts = ApplicationOptions {
            guid: Some(guid.clone()),
            name: Some("7-Zip 24.09".into()),
            ..no_source_opts()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
        assert_eq!(report.entity.unwrap().name, "7-Zip 24.09");
        assert!(
            backend
                .find_by_name(EntityKind::Application, "7zip 24.09")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_remove_only_path_is_conflict() {
        let mut backend = MemoryBackend::new();
        reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();

        let opts = ApplicationOptions {
            paths: Some(ListSpec {
                remove: Some(vec![String::new()]),
                ..Default::default()
            }),
            ..no_source_opts()
        };
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_path_add_then_remove_round_trips() {
        let mut backend = MemoryBackend::new();
        reconcile(&mut backend, &no_source_opts(), RunMode::Apply).unwrap();

        let add = ApplicationOptions {
            paths: Some(ListSpec {
                add: Some(vec!["Win11".into()]),
                ..Default::default()
            }),
            ..no_source_opts()
        };
        let added = reconcile(&mut backend, &add, RunMode::Apply).unwrap();
        assert!(added.changed);
        assert_eq!(
            added.entity.unwrap().paths,
            vec!["Applications", "Applications\\Win11"]
        );

        let remove = ApplicationOptions {
            paths: Some(ListSpec {
                remove: Some(vec!["Win11".into()]),
                ..Default::default()
            }),
            ..no_source_opts()
        };
        let removed = reconcile(&mut backend, &remove, RunMode::Apply).unwrap();
        assert!(removed.changed);
        assert_eq!(removed.entity.unwrap().paths, vec!["Applications"]);
    }

    #[test]
    fn test_source_files_staged_and_drift_detected() {
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("setup.exe"), "installer v1").unwrap();

        let mut backend = MemoryBackend::new();
        let opts = ApplicationOptions {
            app_type: Some(AppType::Source),
            short_name: Some("7zip".into()),
            version: Some("24.09".into()),
            command_line: Some("setup.exe /S".into()),
            source_path: Some(tmp.path().display().to_string()),
            ..Default::default()
        };

        let created = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(created.changed);
        let files = created.entity.unwrap().files.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "setup.exe");

        // Unchanged payload: no drift.
        let same = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!same.changed);

        // Changed payload: files drift forces a staging run even though no
        // metadata changed.
        std::fs::write(tmp.path().join("setup.exe"), "installer v2").unwrap();
        let drifted = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(drifted.changed);
    }
}
