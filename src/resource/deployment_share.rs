//! Deployment share reconciliation.
//!
//! Shares are the container the other entities live in, so their
//! lifecycle runs outside the item protocol: present reconciles the root
//! directory, the SMB share, and the persistent-drive registration;
//! absent unregisters the share and leaves its contents on disk.

use super::expand_path;
use mdtkit::{Backend, ShareRecord};
use reconcile::{DesiredState, Error, Report, Result, RunMode};
use serde::{Deserialize, Serialize};

/// Options for one deployment-share request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentShareOptions {
    /// Persistent drive name; selects the share when state is absent
    pub name: Option<String>,
    /// The share's root directory
    pub path: Option<String>,
    pub description: Option<String>,
    pub share_name: Option<String>,
    #[serde(default)]
    pub state: DesiredState,
}

/// The reported state of a deployment share.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentShareSnapshot {
    pub name: String,
    pub path: String,
    pub description: String,
    pub share_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_created: Option<bool>,
}

/// Reconcile a deployment share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DeploymentShareOptions,
    mode: RunMode,
) -> Result<Report<DeploymentShareSnapshot>> {
    match opts.state {
        DesiredState::Present => present(backend, opts, mode),
        DesiredState::Absent => absent(backend, opts, mode),
    }
}

fn present<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DeploymentShareOptions,
    mode: RunMode,
) -> Result<Report<DeploymentShareSnapshot>> {
    if opts.name.is_some() {
        return Err(Error::validation(
            "name is only used when state is absent; identify the share by path",
        ));
    }
    let path = opts
        .path
        .as_deref()
        .ok_or_else(|| Error::validation("path is required when state is present"))?;
    let description = opts
        .description
        .as_deref()
        .ok_or_else(|| Error::validation("description is required when state is present"))?;
    let share_name = opts
        .share_name
        .as_deref()
        .ok_or_else(|| Error::validation("share_name is required when state is present"))?;
    let path = expand_path(path);

    match backend.find_share_by_path(&path)? {
        None => {
            if mode.is_check() {
                return Ok(Report::changed(DeploymentShareSnapshot {
                    name: String::new(),
                    path: path.display().to_string(),
                    description: description.to_string(),
                    share_name: share_name.to_string(),
                    directory_created: Some(!path.exists()),
                }));
            }
            let created = backend.create_share(&path, description, share_name)?;
            Ok(Report::changed(snapshot(
                &created.record,
                Some(created.directory_created),
            )))
        }
        Some(existing) => {
            let new_description =
                (existing.description != description).then_some(description);
            let new_share_name = (existing.share_name != share_name).then_some(share_name);

            if new_description.is_none() && new_share_name.is_none() {
                return Ok(Report::unchanged(snapshot(&existing, None)));
            }
            if mode.is_check() {
                let mut predicted = existing.clone();
                predicted.description = description.to_string();
                predicted.share_name = share_name.to_string();
                return Ok(Report::changed(snapshot(&predicted, None)));
            }
            backend.update_share(&existing.name, new_description, new_share_name)?;
            let refreshed = backend
                .find_share_by_name(&existing.name)?
                .ok_or_else(|| Error::backend("deployment share vanished during update"))?;
            Ok(Report::changed(snapshot(&refreshed, None)))
        }
    }
}

fn absent<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DeploymentShareOptions,
    mode: RunMode,
) -> Result<Report<DeploymentShareSnapshot>> {
    if opts.description.is_some() || opts.share_name.is_some() {
        return Err(Error::validation(
            "description and share_name must not be provided when state is absent",
        ));
    }
    let existing = match (&opts.name, &opts.path) {
        (Some(_), Some(_)) => {
            return Err(Error::validation(
                "name and path are mutually exclusive when state is absent",
            ));
        }
        (None, None) => {
            return Err(Error::validation("one of name or path is required"));
        }
        (Some(name), None) => backend.find_share_by_name(name)?,
        (None, Some(path)) => backend.find_share_by_path(&expand_path(path))?,
    };

    let Some(share) = existing else {
        return Ok(Report::removed(false));
    };
    if !mode.is_check() {
        backend.remove_share(&share.name)?;
    }
    let report: Report<DeploymentShareSnapshot> = Report::removed(true);
    Ok(report.with_diagnostic(format!(
        "unregistered deployment share {} at {}; contents were left on disk",
        share.name,
        share.path.display()
    )))
}

fn snapshot(record: &ShareRecord, directory_created: Option<bool>) -> DeploymentShareSnapshot {
    DeploymentShareSnapshot {
        name: record.name.clone(),
        path: record.path.display().to_string(),
        description: record.description.clone(),
        share_name: record.share_name.clone(),
        directory_created,
    }
}
