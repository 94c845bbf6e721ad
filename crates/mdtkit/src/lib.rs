//! # mdtkit
//!
//! Client for the Microsoft Deployment Toolkit administrative interface.
//!
//! This crate provides functionality to:
//! - Read and mutate deployment-share items (applications, operating
//!   systems, drivers, task sequences, selection profiles) as attribute
//!   bags through the [`backend::Backend`] trait
//! - Manage deployment shares and share directories
//! - Digest file payloads with SHA-256 for timestamp-free change detection
//!
//! Two backends ship with the crate: [`backend::powershell`] drives the
//! real snap-in, and [`backend::memory`] is a fake share for tests and
//! plan-only runs.

pub mod backend;
pub mod digest;
pub mod ops;
mod types;

pub use backend::{Backend, default_backend};
pub use backend::memory::MemoryBackend;
pub use backend::powershell::PowerShellBackend;
pub use digest::{FileDigest, digest_file, digest_tree};
pub use ops::EntityOps;
pub use types::{DriverRecord, EntityKind, EntityRecord, ShareCreated, ShareRecord};
