//! Driver import reconciliation.
//!
//! Driver parsing is the toolkit's business; this layer only decides
//! whether an import is needed. With `import_duplicates` unset the import
//! is idempotent: driver files whose content hash already exists in the
//! share are skipped, and a run that skips everything reports no change.

use super::expand_path;
use mdtkit::{Backend, DriverRecord, digest_tree};
use reconcile::{Error, Report, Result, RunMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for one driver-import request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverImportOptions {
    /// Directories containing driver files or CAB files
    pub source_paths: Vec<String>,
    /// Destination folder relative to the share root
    pub path: String,
    #[serde(default)]
    pub import_duplicates: bool,
}

/// The drivers an import brought in.
#[derive(Debug, Clone, Serialize)]
pub struct DriverImportSnapshot {
    pub path: String,
    pub drivers: Vec<DriverRecord>,
}

/// Reconcile a driver import against the share.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DriverImportOptions,
    mode: RunMode,
) -> Result<Report<DriverImportSnapshot>> {
    let sources = validate(opts)?;
    let folder = opts.path.trim_matches('\\').to_string();

    if mode.is_check() {
        // Predict the import from local digests without touching the share.
        let known = backend.driver_hashes()?;
        let mut would_import = false;
        for source in &sources {
            for file in digest_tree(source)? {
                if !file.path.to_lowercase().ends_with(".inf") {
                    continue;
                }
                if opts.import_duplicates || !known.contains(&file.sha256_checksum) {
                    would_import = true;
                }
            }
        }
        let report = Report {
            changed: would_import,
            entity: Some(DriverImportSnapshot {
                path: folder,
                drivers: Vec::new(),
            }),
            diagnostics: Vec::new(),
        };
        return Ok(report);
    }

    let imported = backend.import_drivers(&sources, &folder, opts.import_duplicates)?;
    let changed = !imported.is_empty();
    let snapshot = DriverImportSnapshot {
        path: folder,
        drivers: imported,
    };
    Ok(if changed {
        Report::changed(snapshot)
    } else {
        Report::unchanged(snapshot)
    })
}

fn validate(opts: &DriverImportOptions) -> Result<Vec<PathBuf>> {
    if opts.source_paths.is_empty() {
        return Err(Error::validation("source_paths must not be empty"));
    }
    if opts.path.trim_matches('\\').is_empty() {
        return Err(Error::validation("path must not be empty"));
    }
    let sources: Vec<PathBuf> = opts.source_paths.iter().map(|p| expand_path(p)).collect();
    for source in &sources {
        if !source.exists() {
            return Err(Error::validation(format!(
                "source path does not exist: {}",
                source.display()
            )));
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdtkit::MemoryBackend;
    use tempfile::TempDir;

    fn opts_for(tmp: &TempDir) -> DriverImportOptions {
        DriverImportOptions {
            source_paths: vec![tmp.path().display().to_string()],
            path: "Out-of-Box Drivers\\WinPE".into(),
            import_duplicates: false,
        }
    }

    #[test]
    fn test_import_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("net.inf"), "network driver").unwrap();

        let mut backend = MemoryBackend::new();
        let first = reconcile(&mut backend, &opts_for(&tmp), RunMode::Apply).unwrap();
        assert!(first.changed);
        assert_eq!(first.entity.unwrap().drivers.len(), 1);

        let second = reconcile(&mut backend, &opts_for(&tmp), RunMode::Apply).unwrap();
        assert!(!second.changed);
        assert!(second.entity.unwrap().drivers.is_empty());
    }

    #[test]
    fn test_import_duplicates_always_imports() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("net.inf"), "network driver").unwrap();

        let mut backend = MemoryBackend::new();
        let mut opts = opts_for(&tmp);
        opts.import_duplicates = true;

        assert!(reconcile(&mut backend, &opts, RunMode::Apply).unwrap().changed);
        assert!(reconcile(&mut backend, &opts, RunMode::Apply).unwrap().changed);
    }

    #[test]
    fn test_check_mode_predicts_without_importing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("net.inf"), "network driver").unwrap();

        let mut backend = MemoryBackend::new();
        let check = reconcile(&mut backend, &opts_for(&tmp), RunMode::Check).unwrap();
        assert!(check.changed);
        assert_eq!(backend.mutations(), 0);

        // Live run agrees, and afterwards check predicts no change.
        let live = reconcile(&mut backend, &opts_for(&tmp), RunMode::Apply).unwrap();
        assert_eq!(live.changed, check.changed);
        let after = reconcile(&mut backend, &opts_for(&tmp), RunMode::Check).unwrap();
        assert!(!after.changed);
    }

    #[test]
    fn test_missing_source_is_validation_error() {
        let mut backend = MemoryBackend::new();
        let opts = DriverImportOptions {
            source_paths: vec!["/does/not/exist".into()],
            path: "Out-of-Box Drivers".into(),
            import_duplicates: false,
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_empty_sources_rejected() {
        let mut backend = MemoryBackend::new();
        let opts = DriverImportOptions {
            source_paths: Vec::new(),
            path: "Out-of-Box Drivers".into(),
            import_duplicates: false,
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }
}
