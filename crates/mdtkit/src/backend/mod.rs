//! Backend abstraction for the deployment-toolkit administrative interface.
//!
//! The [`Backend`] trait defines every operation the reconciliation layer
//! needs against a deployment share, allowing for different implementations
//! (the real PowerShell snap-in, an in-memory share for tests and
//! plan-only runs). All read operations are guaranteed side-effect free;
//! every mutation flows through the handful of `&mut self` methods, which
//! is what keeps check mode verifiable.

pub mod memory;
pub mod powershell;

use crate::digest::FileDigest;
use crate::types::{DriverRecord, EntityKind, EntityRecord, ShareCreated, ShareRecord};
use reconcile::{AttrMap, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Operations against one deployment share and the toolkit that hosts it.
pub trait Backend {
    /// Check if the toolkit is reachable.
    fn is_available(&self) -> bool;

    // ------------------------------------------------------------------
    // Share items
    // ------------------------------------------------------------------

    /// Look up an item by its GUID.
    fn find_by_guid(&self, kind: EntityKind, guid: &str) -> Result<Option<EntityRecord>>;

    /// Look up an item by its full name.
    fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>>;

    /// List every item of a kind.
    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>>;

    /// Create an item under a logical folder and return its record.
    fn create(
        &mut self,
        kind: EntityKind,
        folder: &str,
        name: &str,
        attrs: &AttrMap,
    ) -> Result<EntityRecord>;

    /// Overwrite the given attributes of an item.
    fn set_attrs(&mut self, kind: EntityKind, guid: &str, attrs: &AttrMap) -> Result<()>;

    /// Rename an item.
    fn rename(&mut self, kind: EntityKind, guid: &str, to: &str) -> Result<()>;

    /// Add an item to a logical folder.
    fn link(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()>;

    /// Remove an item from a logical folder.
    fn unlink(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()>;

    /// Remove an item from every folder it appears in.
    fn delete(&mut self, kind: EntityKind, guid: &str) -> Result<()>;

    /// Copy an item's file payload from a source directory.
    fn stage_files(&mut self, kind: EntityKind, guid: &str, source: &Path) -> Result<()>;

    /// Digest an item's currently staged file payload.
    fn staged_files(&self, kind: EntityKind, guid: &str) -> Result<Vec<FileDigest>>;

    // ------------------------------------------------------------------
    // Share directories
    // ------------------------------------------------------------------

    fn directory_exists(&self, path: &str) -> Result<bool>;

    fn create_directory(&mut self, path: &str) -> Result<()>;

    fn remove_directory(&mut self, path: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Drivers
    // ------------------------------------------------------------------

    /// Content hashes of every driver already in the share.
    ///
    /// Read-only; used to predict what a driver import would change.
    fn driver_hashes(&self) -> Result<HashSet<String>>;

    /// Import drivers from the source directories into a folder.
    ///
    /// Returns only the drivers that were actually imported; with
    /// `import_duplicates` unset, drivers whose content hash is already in
    /// the share are skipped, which is what makes the operation idempotent.
    fn import_drivers(
        &mut self,
        sources: &[PathBuf],
        folder: &str,
        import_duplicates: bool,
    ) -> Result<Vec<DriverRecord>>;

    // ------------------------------------------------------------------
    // Deployment shares
    // ------------------------------------------------------------------

    fn find_share_by_name(&self, name: &str) -> Result<Option<ShareRecord>>;

    fn find_share_by_path(&self, path: &Path) -> Result<Option<ShareRecord>>;

    /// Create and register a deployment share.
    fn create_share(
        &mut self,
        path: &Path,
        description: &str,
        share_name: &str,
    ) -> Result<ShareCreated>;

    /// Update an existing share's description and/or SMB share name.
    fn update_share(
        &mut self,
        name: &str,
        description: Option<&str>,
        share_name: Option<&str>,
    ) -> Result<()>;

    /// Unregister a deployment share, leaving its contents on disk.
    fn remove_share(&mut self, name: &str) -> Result<()>;
}

/// Get the default backend (the PowerShell snap-in).
pub fn default_backend(
    installation_path: &Path,
    share_path: &Path,
) -> Result<powershell::PowerShellBackend> {
    powershell::PowerShellBackend::new(installation_path, share_path)
}
