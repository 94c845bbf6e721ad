//! Share directory reconciliation.
//!
//! Directories are the simplest entity: a path relative to the share root
//! that either exists or does not. Missing parent directories are created
//! along the way.

use mdtkit::Backend;
use reconcile::{DesiredState, Error, Report, Result, RunMode};
use serde::{Deserialize, Serialize};

/// Options for one directory request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryOptions {
    /// Path of the directory within the share, relative to the share root
    pub path: String,
    #[serde(default)]
    pub state: DesiredState,
}

/// The reported state of a directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySnapshot {
    pub path: String,
    pub exists: bool,
}

/// Reconcile a share directory.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DirectoryOptions,
    mode: RunMode,
) -> Result<Report<DirectorySnapshot>> {
    let path = normalize(&opts.path)?;
    let exists = backend.directory_exists(&path)?;

    match (opts.state, exists) {
        (DesiredState::Present, true) => Ok(Report::unchanged(DirectorySnapshot {
            path,
            exists: true,
        })),
        (DesiredState::Present, false) => {
            if !mode.is_check() {
                for ancestor in ancestors(&path) {
                    if !backend.directory_exists(&ancestor)? {
                        backend.create_directory(&ancestor)?;
                    }
                }
            }
            Ok(Report::changed(DirectorySnapshot { path, exists: true }))
        }
        (DesiredState::Absent, false) => Ok(Report::removed(false)),
        (DesiredState::Absent, true) => {
            if !mode.is_check() {
                backend.remove_directory(&path)?;
            }
            Ok(Report::removed(true))
        }
    }
}

fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('\\');
    if trimmed.is_empty() {
        return Err(Error::validation("path must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Every prefix of the path, shallowest first, ending with the path itself.
fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut prefix = String::new();
    for part in path.split('\\') {
        if !prefix.is_empty() {
            prefix.push('\\');
        }
        prefix.push_str(part);
        result.push(prefix.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdtkit::MemoryBackend;

    #[test]
    fn test_create_with_parents() {
        let mut backend = MemoryBackend::new();
        let opts = DirectoryOptions {
            path: "Operating Systems\\Windows10\\Drivers".into(),
            state: DesiredState::Present,
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
        assert!(backend.directory_exists("Operating Systems").unwrap());
        assert!(
            backend
                .directory_exists("Operating Systems\\Windows10")
                .unwrap()
        );

        let again = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_absent_is_noop_when_missing() {
        let mut backend = MemoryBackend::new();
        let opts = DirectoryOptions {
            path: "Applications\\Gone".into(),
            state: DesiredState::Absent,
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!report.changed);
        assert_eq!(backend.mutations(), 0);
    }

    #[test]
    fn test_remove_existing() {
        let mut backend = MemoryBackend::new();
        let create = DirectoryOptions {
            path: "Applications\\Temp".into(),
            state: DesiredState::Present,
        };
        reconcile(&mut backend, &create, RunMode::Apply).unwrap();

        let remove = DirectoryOptions {
            path: "Applications\\Temp".into(),
            state: DesiredState::Absent,
        };
        let report = reconcile(&mut backend, &remove, RunMode::Apply).unwrap();
        assert!(report.changed);
        assert!(!backend.directory_exists("Applications\\Temp").unwrap());
    }

    #[test]
    fn test_check_mode_creates_nothing() {
        let mut backend = MemoryBackend::new();
        let opts = DirectoryOptions {
            path: "Applications\\New".into(),
            state: DesiredState::Present,
        };
        let report = reconcile(&mut backend, &opts, RunMode::Check).unwrap();
        assert!(report.changed);
        assert_eq!(backend.mutations(), 0);
        assert!(!backend.directory_exists("Applications\\New").unwrap());
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut backend = MemoryBackend::new();
        let opts = DirectoryOptions {
            path: "\\".into(),
            state: DesiredState::Present,
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }
}
