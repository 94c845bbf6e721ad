//! Task sequence reconciliation.
//!
//! Task sequences are addressed by their human-assigned ID rather than a
//! GUID, so this module runs its own lookup before entering the shared
//! protocol. The referenced operating system is resolved up front; a
//! dangling reference fails the whole request before any mutation.

use super::{
    ItemOutcome, ItemRequest, converge_resolved, forbid_for_absent, share_path_edit,
};
use mdtkit::{Backend, EntityKind, EntityRecord};
use reconcile::{
    AttrMap, AttrValue, DesiredState, Error, ListSpec, Report, Result, RunMode, supplied,
};
use serde::{Deserialize, Serialize};

/// The kind of product key supplied to a task sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKeyType {
    #[default]
    None,
    Mak,
    Retail,
}

impl ProductKeyType {
    fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mak => "mak",
            Self::Retail => "retail",
        }
    }
}

/// Options for one task-sequence request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSequenceOptions {
    pub id: Option<String>,
    pub name: Option<String>,
    pub paths: Option<ListSpec<String>>,
    pub template: Option<String>,
    pub operating_system_guid: Option<String>,
    pub operating_system_name: Option<String>,
    pub product_key_type: Option<ProductKeyType>,
    pub product_key: Option<String>,
    pub admin_password: Option<String>,
    pub full_name: Option<String>,
    pub organization: Option<String>,
    pub ie_home_page: Option<String>,
    pub version: Option<String>,
    pub comments: Option<String>,
    pub enabled: Option<bool>,
    pub hidden: Option<bool>,
    #[serde(default)]
    pub state: DesiredState,
}

/// The operating system a task sequence deploys.
#[derive(Debug, Clone, Serialize)]
pub struct OperatingSystemRef {
    pub guid: String,
    pub name: String,
}

/// The reported state of a task sequence.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSequenceSnapshot {
    pub guid: String,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<OperatingSystemRef>,
    pub product_key_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ie_home_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub paths: Vec<String>,
    pub comments: String,
    pub enabled: bool,
    pub hidden: bool,
}

/// Reconcile a task sequence against the share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &TaskSequenceOptions,
    mode: RunMode,
) -> Result<Report<TaskSequenceSnapshot>> {
    validate(opts)?;

    let current = lookup(backend, opts)?;

    // The ID is the identity; a differing name on an existing sequence is
    // a rename, mirroring the GUID-plus-name rule of other kinds.
    let rename_to = match (&current, &opts.name) {
        (Some(record), Some(name)) if opts.id.is_some() && record.name != *name => {
            Some(name.clone())
        }
        _ => None,
    };

    let os = resolve_operating_system(backend, opts)?;
    if opts.state.is_present() && current.is_none() && os.is_none() {
        return Err(Error::validation(
            "operating_system_guid or operating_system_name is required to create a task sequence",
        ));
    }

    let path_edit = match opts.paths.clone() {
        Some(spec) => spec.into_edit("paths")?,
        None => None,
    };

    let request = ItemRequest {
        kind: EntityKind::TaskSequence,
        state: opts.state,
        create_name: opts.name.clone(),
        create_attrs: create_attrs(opts, os.as_ref()),
        update_attrs: update_attrs(opts, os.as_ref()),
        path_edit: share_path_edit(EntityKind::TaskSequence, path_edit),
        source: None,
    };

    let outcome = converge_resolved(backend, request, current, rename_to, mode)?;
    Ok(into_report(backend, outcome))
}

/// Build a snapshot from a fetched record.
pub fn snapshot<B: Backend + ?Sized>(backend: &B, record: &EntityRecord) -> TaskSequenceSnapshot {
    from_record(backend, record)
}

fn validate(opts: &TaskSequenceOptions) -> Result<()> {
    match opts.state {
        DesiredState::Absent => {
            match (&opts.id, &opts.name) {
                (None, None) => {
                    return Err(Error::validation("one of id or name is required"));
                }
                (Some(_), Some(_)) => {
                    return Err(Error::validation(
                        "id and name are mutually exclusive when state is absent",
                    ));
                }
                _ => {}
            }
            forbid_for_absent(&[
                ("paths", opts.paths.is_some()),
                ("template", opts.template.is_some()),
                (
                    "operating_system_guid",
                    opts.operating_system_guid.is_some(),
                ),
                (
                    "operating_system_name",
                    opts.operating_system_name.is_some(),
                ),
                ("product_key_type", opts.product_key_type.is_some()),
                ("product_key", opts.product_key.is_some()),
                ("admin_password", opts.admin_password.is_some()),
                ("full_name", opts.full_name.is_some()),
                ("organization", opts.organization.is_some()),
                ("ie_home_page", opts.ie_home_page.is_some()),
                ("version", opts.version.is_some()),
                ("comments", opts.comments.is_some()),
                ("enabled", opts.enabled.is_some()),
                ("hidden", opts.hidden.is_some()),
            ])
        }
        DesiredState::Present => {
            if opts.id.is_none() {
                return Err(Error::validation("id is required when state is present"));
            }
            if opts.name.is_none() {
                return Err(Error::validation("name is required when state is present"));
            }
            if opts.template.is_none() {
                return Err(Error::validation(
                    "template is required when state is present",
                ));
            }
            if opts.full_name.is_none() {
                return Err(Error::validation(
                    "full_name is required when state is present",
                ));
            }
            if opts.organization.is_none() {
                return Err(Error::validation(
                    "organization is required when state is present",
                ));
            }
            if opts.operating_system_guid.is_some() && opts.operating_system_name.is_some() {
                return Err(Error::validation(
                    "operating_system_guid and operating_system_name are mutually exclusive",
                ));
            }
            match opts.product_key_type.unwrap_or_default() {
                ProductKeyType::None => {
                    if opts.product_key.is_some() {
                        return Err(Error::validation(
                            "product_key must not be provided when product_key_type is none",
                        ));
                    }
                }
                ProductKeyType::Mak | ProductKeyType::Retail => {
                    if opts.product_key.is_none() {
                        return Err(Error::validation(
                            "product_key is required when product_key_type is mak or retail",
                        ));
                    }
                }
            }
            Ok(())
        }
    }
}

/// Find the task sequence by ID first, then by name.
fn lookup<B: Backend + ?Sized>(
    backend: &B,
    opts: &TaskSequenceOptions,
) -> Result<Option<EntityRecord>> {
    if let Some(id) = &opts.id {
        let found = backend
            .list(EntityKind::TaskSequence)?
            .into_iter()
            .find(|r| r.attr_str("ID") == Some(id.as_str()));
        if found.is_some() {
            return Ok(found);
        }
    }
    if let Some(name) = &opts.name
        && opts.id.is_none()
    {
        return backend.find_by_name(EntityKind::TaskSequence, name);
    }
    Ok(None)
}

/// Resolve the requested operating system to its record.
fn resolve_operating_system<B: Backend + ?Sized>(
    backend: &B,
    opts: &TaskSequenceOptions,
) -> Result<Option<EntityRecord>> {
    let found = if let Some(guid) = &opts.operating_system_guid {
        backend
            .find_by_guid(EntityKind::OperatingSystem, guid)?
            .ok_or_else(|| Error::not_found("operating system", guid))?
    } else if let Some(name) = &opts.operating_system_name {
        backend
            .find_by_name(EntityKind::OperatingSystem, name)?
            .ok_or_else(|| Error::not_found("operating system", name))?
    } else {
        return Ok(None);
    };
    Ok(Some(found))
}

fn create_attrs(opts: &TaskSequenceOptions, os: Option<&EntityRecord>) -> AttrMap {
    supplied([
        ("ID", opts.id.clone().map(AttrValue::from)),
        ("TaskSequenceTemplate", opts.template.clone().map(AttrValue::from)),
        (
            "OperatingSystemGuid",
            os.map(|r| AttrValue::from(r.guid.clone())),
        ),
        (
            "ProductKeyType",
            Some(opts.product_key_type.unwrap_or_default().as_str().into()),
        ),
        ("ProductKey", opts.product_key.clone().map(AttrValue::from)),
        (
            "AdminPassword",
            opts.admin_password.clone().map(AttrValue::from),
        ),
        ("FullName", opts.full_name.clone().map(AttrValue::from)),
        ("OrgName", opts.organization.clone().map(AttrValue::from)),
        (
            "HomePage",
            Some(
                opts.ie_home_page
                    .clone()
                    .unwrap_or_else(|| "about:blank".to_string())
                    .into(),
            ),
        ),
        (
            "Version",
            Some(opts.version.clone().unwrap_or_else(|| "1.0".to_string()).into()),
        ),
        (
            "Comments",
            Some(opts.comments.clone().unwrap_or_default().into()),
        ),
        ("enable", Some(opts.enabled.unwrap_or(true).into())),
        ("hide", Some(opts.hidden.unwrap_or(false).into())),
    ])
}

fn update_attrs(opts: &TaskSequenceOptions, os: Option<&EntityRecord>) -> AttrMap {
    supplied([
        ("ID", opts.id.clone().map(AttrValue::from)),
        ("TaskSequenceTemplate", opts.template.clone().map(AttrValue::from)),
        (
            "OperatingSystemGuid",
            os.map(|r| AttrValue::from(r.guid.clone())),
        ),
        (
            "ProductKeyType",
            opts.product_key_type
                .map(|t| AttrValue::from(t.as_str())),
        ),
        ("ProductKey", opts.product_key.clone().map(AttrValue::from)),
        (
            "AdminPassword",
            opts.admin_password.clone().map(AttrValue::from),
        ),
        ("FullName", opts.full_name.clone().map(AttrValue::from)),
        ("OrgName", opts.organization.clone().map(AttrValue::from)),
        ("HomePage", opts.ie_home_page.clone().map(AttrValue::from)),
        ("Version", opts.version.clone().map(AttrValue::from)),
        ("Comments", opts.comments.clone().map(AttrValue::from)),
        ("enable", opts.enabled.map(AttrValue::from)),
        ("hide", opts.hidden.map(AttrValue::from)),
    ])
}

fn into_report<B: Backend + ?Sized>(
    backend: &B,
    outcome: ItemOutcome,
) -> Report<TaskSequenceSnapshot> {
    let ItemOutcome {
        changed,
        record,
        diagnostics,
        ..
    } = outcome;
    let mut report = Report {
        changed,
        entity: record.map(|r| from_record(backend, &r)),
        diagnostics: Vec::new(),
    };
    for note in diagnostics {
        report = report.with_diagnostic(note);
    }
    report
}

fn from_record<B: Backend + ?Sized>(backend: &B, record: &EntityRecord) -> TaskSequenceSnapshot {
    let operating_system = record.attr_str("OperatingSystemGuid").and_then(|guid| {
        backend
            .find_by_guid(EntityKind::OperatingSystem, guid)
            .ok()
            .flatten()
            .map(|os| OperatingSystemRef {
                guid: os.guid,
                name: os.name,
            })
    });

    TaskSequenceSnapshot {
        guid: record.guid.clone(),
        id: record.attr_str("ID").unwrap_or_default().to_string(),
        name: record.name.clone(),
        template: record.attr_str("TaskSequenceTemplate").map(str::to_string),
        operating_system,
        product_key_type: record
            .attr_str("ProductKeyType")
            .unwrap_or("none")
            .to_string(),
        full_name: record.attr_str("FullName").map(str::to_string),
        organization: record.attr_str("OrgName").map(str::to_string),
        ie_home_page: record.attr_str("HomePage").map(str::to_string),
        version: record.attr_str("Version").map(str::to_string),
        paths: record.paths.clone(),
        comments: record.attr_str("Comments").unwrap_or_default().to_string(),
        enabled: record.attr_bool("enable").unwrap_or(true),
        hidden: record.attr_bool("hide").unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::operating_system::{self, OperatingSystemOptions, OsType};
    use mdtkit::MemoryBackend;
    use tempfile::TempDir;

    /// Seed an operating system the sequences can reference.
    fn seed_os(backend: &mut MemoryBackend, tmp: &TempDir) {
        std::fs::write(tmp.path().join("install.wim"), "image").unwrap();
        let opts = OperatingSystemOptions {
            name: Some("Windows 11 Enterprise".into()),
            os_type: Some(OsType::Wim),
            source_path: Some(tmp.path().join("install.wim").display().to_string()),
            destination_folder: Some("Windows 11".into()),
            image_index: Some(6),
            ..Default::default()
        };
        operating_system::reconcile(backend, &opts, RunMode::Apply).unwrap();
    }

    fn ts_opts() -> TaskSequenceOptions {
        TaskSequenceOptions {
            id: Some("WIN11-ENT".into()),
            name: Some("Windows 11 Enterprise".into()),
            template: Some("Client.xml".into()),
            operating_system_name: Some("Windows 11 Enterprise".into()),
            full_name: Some("Windows User".into()),
            organization: Some("Contoso".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let mut backend = MemoryBackend::new();
        seed_os(&mut backend, &tmp);

        let report = reconcile(&mut backend, &ts_opts(), RunMode::Apply).unwrap();
        assert!(report.changed);
        let snapshot = report.entity.unwrap();
        assert_eq!(snapshot.id, "WIN11-ENT");
        assert_eq!(snapshot.version.as_deref(), Some("1.0"));
        assert_eq!(snapshot.ie_home_page.as_deref(), Some("about:blank"));
        assert_eq!(snapshot.product_key_type, "none");
        let os = snapshot.operating_system.unwrap();
        assert_eq!(os.name, "Windows 11 Enterprise");
        assert_eq!(snapshot.paths, vec!["Task Sequences"]);
    }

    #[test]
    fn test_idempotent_second_run() {
        let tmp = TempDir::new().unwrap();
        let mut backend = MemoryBackend::new();
        seed_os(&mut backend, &tmp);

        assert!(reconcile(&mut backend, &ts_opts(), RunMode::Apply).unwrap().changed);
        assert!(!reconcile(&mut backend, &ts_opts(), RunMode::Apply).unwrap().changed);
    }

    #[test]
    fn test_both_os_references_rejected_before_any_call() {
        let mut backend = MemoryBackend::new();
        let mut opts = ts_opts();
        opts.operating_system_guid = Some("{12345678-1234-1234-1234-123456789012}".into());
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_dangling_os_reference_fails_whole_request() {
        let mut backend = MemoryBackend::new();
        let err = reconcile(&mut backend, &ts_opts(), RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_product_key_rules() {
        let mut backend = MemoryBackend::new();

        let mut opts = ts_opts();
        opts.product_key_type = Some(ProductKeyType::Mak);
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let mut opts = ts_opts();
        opts.product_key = Some("12345-67890-12345-67890-12345".into());
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_rename_keeps_id_as_identity() {
        let tmp = TempDir::new().unwrap();
        let mut backend = MemoryBackend::new();
        seed_os(&mut backend, &tmp);
        reconcile(&mut backend, &ts_opts(), RunMode::Apply).unwrap();

        let mut opts = ts_opts();
        opts.name = Some("Windows 11 Enterprise v2".into());
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
        let snapshot = report.entity.unwrap();
        assert_eq!(snapshot.name, "Windows 11 Enterprise v2");
        assert_eq!(snapshot.id, "WIN11-ENT");
    }

    #[test]
    fn test_absent_requires_exactly_one_selector() {
        let mut backend = MemoryBackend::new();
        let opts = TaskSequenceOptions {
            id: Some("WIN11-ENT".into()),
            name: Some("Windows 11 Enterprise".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));

        let opts = TaskSequenceOptions {
            id: Some("WIN11-ENT".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!report.changed);
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_empty_admin_password_clears() {
        let tmp = TempDir::new().unwrap();
        let mut backend = MemoryBackend::new();
        seed_os(&mut backend, &tmp);

        let mut opts = ts_opts();
        opts.admin_password = Some("Password123!".into());
        reconcile(&mut backend, &opts, RunMode::Apply).unwrap();

        let mut opts = ts_opts();
        opts.admin_password = Some(String::new());
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
    }
}
