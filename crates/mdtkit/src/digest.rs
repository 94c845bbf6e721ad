//! Content digesting for file-backed entities.
//!
//! Applications and operating systems carry a physical file payload.
//! Change detection hashes every file under the payload directory rather
//! than trusting timestamps; a digest mismatch between a source tree and
//! the staged copy signals a files-changed condition distinct from a
//! metadata-only change.

use reconcile::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// A file's path relative to its tree root, plus its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    pub path: String,
    pub sha256_checksum: String,
}

/// Digest every file under `base`, sorted by relative path.
///
/// Paths are normalized to forward slashes so digests compare across
/// platforms.
pub fn digest_tree(base: &Path) -> Result<Vec<FileDigest>> {
    if !base.exists() {
        return Err(Error::validation(format!(
            "source path does not exist: {}",
            base.display()
        )));
    }
    if base.is_file() {
        let digest = digest_file(base)?;
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![FileDigest {
            path: name,
            sha256_checksum: digest,
        }]);
    }

    let mut digests = Vec::new();
    for entry in WalkDir::new(base).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        digests.push(FileDigest {
            path: rel,
            sha256_checksum: digest_file(entry.path())?,
        });
    }
    digests.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(digests)
}

/// Compute the hex SHA-256 digest of a single file.
pub fn digest_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        Error::backend(format!("failed to open {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| {
            Error::backend(format!("failed to read {}: {e}", path.display()))
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_known_value() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        // sha256("hello")
        assert_eq!(
            digest_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_tree_digest_is_sorted_and_relative() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("sub").join("c.txt"), "c").unwrap();

        let digests = digest_tree(tmp.path()).unwrap();
        let paths: Vec<&str> = digests.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_single_file_tree() {
        let tmp = TempDir::new().unwrap();
        let wim = tmp.path().join("install.wim");
        std::fs::write(&wim, "image bytes").unwrap();

        let digests = digest_tree(&wim).unwrap();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].path, "install.wim");
    }

    #[test]
    fn test_missing_source_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        let err = digest_tree(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_identical_content_same_digest() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one"), "same content").unwrap();
        std::fs::write(tmp.path().join("two"), "same content").unwrap();

        let digests = digest_tree(tmp.path()).unwrap();
        assert_eq!(digests[0].sha256_checksum, digests[1].sha256_checksum);
    }
}
