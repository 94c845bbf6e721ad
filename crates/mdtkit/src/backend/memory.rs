//! In-memory deployment share.
//!
//! Backs tests and plan-only runs with a fake share that honors the same
//! contract as the snap-in. Every mutating method bumps a counter, so
//! callers can assert that check-mode runs issued zero mutating calls.

use crate::backend::Backend;
use crate::digest::{self, FileDigest};
use crate::types::{DriverRecord, EntityKind, EntityRecord, ShareCreated, ShareRecord};
use reconcile::{AttrMap, Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A fake deployment share held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: HashMap<EntityKind, Vec<EntityRecord>>,
    staged: HashMap<(EntityKind, String), Vec<FileDigest>>,
    directories: BTreeSet<String>,
    drivers: Vec<DriverRecord>,
    shares: Vec<ShareRecord>,
    seen_share_paths: BTreeSet<PathBuf>,
    next_guid: u32,
    next_share: u32,
    mutations: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls issued so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    fn generate_guid(&mut self) -> String {
        self.next_guid += 1;
        format!("{{00000000-0000-4000-8000-{:012x}}}", self.next_guid)
    }

    fn records(&self, kind: EntityKind) -> &[EntityRecord] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn record_mut(&mut self, kind: EntityKind, guid: &str) -> Result<&mut EntityRecord> {
        self.entities
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|r| r.guid == guid)
            .ok_or_else(|| Error::not_found(kind.label(), guid))
    }
}

impl Backend for MemoryBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn find_by_guid(&self, kind: EntityKind, guid: &str) -> Result<Option<EntityRecord>> {
        Ok(self.records(kind).iter().find(|r| r.guid == guid).cloned())
    }

    fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>> {
        Ok(self.records(kind).iter().find(|r| r.name == name).cloned())
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        Ok(self.records(kind).to_vec())
    }

    fn create(
        &mut self,
        kind: EntityKind,
        folder: &str,
        name: &str,
        attrs: &AttrMap,
    ) -> Result<EntityRecord> {
        self.mutations += 1;
        if self.records(kind).iter().any(|r| r.name == name) {
            return Err(Error::backend(format!(
                "a {} named {name} already exists",
                kind.label()
            )));
        }
        let record = EntityRecord {
            guid: self.generate_guid(),
            name: name.to_string(),
            attrs: attrs.clone(),
            paths: vec![folder.to_string()],
        };
        self.entities.entry(kind).or_default().push(record.clone());
        Ok(record)
    }

    fn set_attrs(&mut self, kind: EntityKind, guid: &str, attrs: &AttrMap) -> Result<()> {
        self.mutations += 1;
        let record = self.record_mut(kind, guid)?;
        for (key, value) in attrs {
            record.attrs.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn rename(&mut self, kind: EntityKind, guid: &str, to: &str) -> Result<()> {
        self.mutations += 1;
        self.record_mut(kind, guid)?.name = to.to_string();
        Ok(())
    }

    fn link(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()> {
        self.mutations += 1;
        let record = self.record_mut(kind, guid)?;
        if !record.paths.iter().any(|p| p == folder) {
            record.paths.push(folder.to_string());
        }
        Ok(())
    }

    fn unlink(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()> {
        self.mutations += 1;
        let record = self.record_mut(kind, guid)?;
        record.paths.retain(|p| p != folder);
        Ok(())
    }

    fn delete(&mut self, kind: EntityKind, guid: &str) -> Result<()> {
        self.mutations += 1;
        let records = self.entities.entry(kind).or_default();
        let before = records.len();
        records.retain(|r| r.guid != guid);
        if records.len() == before {
            return Err(Error::not_found(kind.label(), guid));
        }
        self.staged.remove(&(kind, guid.to_string()));
        Ok(())
    }

    fn stage_files(&mut self, kind: EntityKind, guid: &str, source: &Path) -> Result<()> {
        self.mutations += 1;
        self.record_mut(kind, guid)?;
        let digests = digest::digest_tree(source)?;
        self.staged.insert((kind, guid.to_string()), digests);
        Ok(())
    }

    fn staged_files(&self, kind: EntityKind, guid: &str) -> Result<Vec<FileDigest>> {
        Ok(self
            .staged
            .get(&(kind, guid.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn directory_exists(&self, path: &str) -> Result<bool> {
        Ok(self.directories.contains(path))
    }

    fn create_directory(&mut self, path: &str) -> Result<()> {
        self.mutations += 1;
        self.directories.insert(path.to_string());
        Ok(())
    }

    fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.mutations += 1;
        self.directories.remove(path);
        Ok(())
    }

    fn driver_hashes(&self) -> Result<HashSet<String>> {
        Ok(self.drivers.iter().map(|d| d.hash.clone()).collect())
    }

    fn import_drivers(
        &mut self,
        sources: &[PathBuf],
        folder: &str,
        import_duplicates: bool,
    ) -> Result<Vec<DriverRecord>> {
        self.mutations += 1;
        let known: HashSet<String> = self.drivers.iter().map(|d| d.hash.clone()).collect();
        let mut imported = Vec::new();

        for source in sources {
            for file in digest::digest_tree(source)? {
                if !file.path.to_lowercase().ends_with(".inf") {
                    continue;
                }
                if !import_duplicates && known.contains(&file.sha256_checksum) {
                    continue;
                }
                let name = file
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&file.path)
                    .trim_end_matches(".inf")
                    .to_string();
                let record = DriverRecord {
                    guid: self.generate_guid(),
                    name: name.clone(),
                    class: "System".to_string(),
                    version: "1.0".to_string(),
                    hash: file.sha256_checksum.clone(),
                    source: source.display().to_string(),
                    platform: vec!["x64".to_string()],
                    os_version: Vec::new(),
                    whql_signed: false,
                };
                self.entities
                    .entry(EntityKind::Driver)
                    .or_default()
                    .push(EntityRecord {
                        guid: record.guid.clone(),
                        name: record.name.clone(),
                        attrs: AttrMap::new(),
                        paths: vec![folder.to_string()],
                    });
                self.drivers.push(record.clone());
                imported.push(record);
            }
        }
        Ok(imported)
    }

    fn find_share_by_name(&self, name: &str) -> Result<Option<ShareRecord>> {
        Ok(self.shares.iter().find(|s| s.name == name).cloned())
    }

    fn find_share_by_path(&self, path: &Path) -> Result<Option<ShareRecord>> {
        Ok(self.shares.iter().find(|s| s.path == path).cloned())
    }

    fn create_share(
        &mut self,
        path: &Path,
        description: &str,
        share_name: &str,
    ) -> Result<ShareCreated> {
        self.mutations += 1;
        if self.shares.iter().any(|s| s.path == path) {
            return Err(Error::backend(format!(
                "a deployment share already exists at {}",
                path.display()
            )));
        }
        self.next_share += 1;
        let record = ShareRecord {
            name: format!("DS{:03}", self.next_share),
            path: path.to_path_buf(),
            description: description.to_string(),
            share_name: share_name.to_string(),
        };
        let directory_created = self.seen_share_paths.insert(path.to_path_buf());
        self.shares.push(record.clone());
        Ok(ShareCreated {
            record,
            directory_created,
        })
    }

    fn update_share(
        &mut self,
        name: &str,
        description: Option<&str>,
        share_name: Option<&str>,
    ) -> Result<()> {
        self.mutations += 1;
        let share = self
            .shares
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found("deployment share", name))?;
        if let Some(description) = description {
            share.description = description.to_string();
        }
        if let Some(share_name) = share_name {
            share.share_name = share_name.to_string();
        }
        Ok(())
    }

    fn remove_share(&mut self, name: &str) -> Result<()> {
        self.mutations += 1;
        let before = self.shares.len();
        self.shares.retain(|s| s.name != name);
        if self.shares.len() == before {
            return Err(Error::not_found("deployment share", name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let mut backend = MemoryBackend::new();
        let record = backend
            .create(
                EntityKind::Application,
                "Applications",
                "7zip 24.09",
                &AttrMap::new(),
            )
            .unwrap();

        assert!(reconcile::is_guid(&record.guid));
        let by_guid = backend
            .find_by_guid(EntityKind::Application, &record.guid)
            .unwrap();
        assert_eq!(by_guid.as_ref().map(|r| r.name.as_str()), Some("7zip 24.09"));
        let by_name = backend
            .find_by_name(EntityKind::Application, "7zip 24.09")
            .unwrap();
        assert_eq!(by_name.map(|r| r.guid), Some(record.guid));
    }

    #[test]
    fn test_names_are_unique_per_kind() {
        let mut backend = MemoryBackend::new();
        backend
            .create(EntityKind::Application, "Applications", "dup", &AttrMap::new())
            .unwrap();
        assert!(
            backend
                .create(EntityKind::Application, "Applications", "dup", &AttrMap::new())
                .is_err()
        );
        // Same name under a different kind is fine.
        backend
            .create(EntityKind::TaskSequence, "Task Sequences", "dup", &AttrMap::new())
            .unwrap();
    }

    #[test]
    fn test_mutation_counter() {
        let mut backend = MemoryBackend::new();
        assert_eq!(backend.mutations(), 0);

        let record = backend
            .create(EntityKind::Application, "Applications", "x", &AttrMap::new())
            .unwrap();
        backend
            .rename(EntityKind::Application, &record.guid, "y")
            .unwrap();
        assert_eq!(backend.mutations(), 2);

        // Reads don't count.
        backend.find_by_name(EntityKind::Application, "y").unwrap();
        backend.list(EntityKind::Application).unwrap();
        assert_eq!(backend.mutations(), 2);
    }

    #[test]
    fn test_driver_import_skips_known_hashes() {
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("net.inf"), "driver one").unwrap();
        std::fs::write(tmp.path().join("video.inf"), "driver two").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "not a driver").unwrap();

        let mut backend = MemoryBackend::new();
        let sources = vec![tmp.path().to_path_buf()];

        let first = backend
            .import_drivers(&sources, "Out-of-Box Drivers", false)
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = backend
            .import_drivers(&sources, "Out-of-Box Drivers", false)
            .unwrap();
        assert!(second.is_empty());

        let forced = backend
            .import_drivers(&sources, "Out-of-Box Drivers", true)
            .unwrap();
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_share_lifecycle() {
        let mut backend = MemoryBackend::new();
        let created = backend
            .create_share(Path::new("C:\\MDTShare"), "My share", "DeploymentShare$")
            .unwrap();
        assert!(created.directory_created);
        assert_eq!(created.record.name, "DS001");

        backend
            .update_share("DS001", Some("Updated"), None)
            .unwrap();
        let found = backend
            .find_share_by_path(Path::new("C:\\MDTShare"))
            .unwrap()
            .unwrap();
        assert_eq!(found.description, "Updated");
        assert_eq!(found.share_name, "DeploymentShare$");

        backend.remove_share("DS001").unwrap();
        assert!(backend.find_share_by_name("DS001").unwrap().is_none());
    }
}
