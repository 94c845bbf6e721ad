//! Data types for deployment-share entities.

use reconcile::{AttrMap, Observed};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The kinds of items a deployment share stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Application,
    OperatingSystem,
    Driver,
    TaskSequence,
    SelectionProfile,
}

impl EntityKind {
    /// The type-specific root folder within the share.
    pub fn root_folder(&self) -> &'static str {
        match self {
            Self::Application => "Applications",
            Self::OperatingSystem => "Operating Systems",
            Self::Driver => "Out-of-Box Drivers",
            Self::TaskSequence => "Task Sequences",
            Self::SelectionProfile => "Selection Profiles",
        }
    }

    /// Human-readable label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::OperatingSystem => "operating system",
            Self::Driver => "driver",
            Self::TaskSequence => "task sequence",
            Self::SelectionProfile => "selection profile",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized read of one share item: identity, attribute bag, and the
/// logical folders the item appears in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub guid: String,
    pub name: String,
    pub attrs: AttrMap,
    pub paths: Vec<String>,
}

impl EntityRecord {
    /// View the record the way the planner consumes it.
    pub fn observed(&self) -> Observed<'_> {
        Observed {
            name: &self.name,
            attrs: &self.attrs,
            paths: &self.paths,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attrs.get(key).and_then(|v| v.as_bool())
    }

    pub fn attr_int(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(|v| v.as_int())
    }

    pub fn attr_list(&self, key: &str) -> Option<&[String]> {
        self.attrs.get(key).and_then(|v| v.as_list())
    }
}

/// A deployment share registered with the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRecord {
    /// The persistent drive name, e.g. `DS001`
    pub name: String,
    /// The share's root directory
    pub path: PathBuf,
    pub description: String,
    /// The SMB share name the directory is published under
    pub share_name: String,
}

/// The outcome of creating a deployment share.
#[derive(Debug, Clone, Serialize)]
pub struct ShareCreated {
    pub record: ShareRecord,
    /// Whether the root directory had to be created, as opposed to only
    /// being registered as a persistent drive
    pub directory_created: bool,
}

/// A driver as reported by the toolkit after import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRecord {
    pub guid: String,
    pub name: String,
    pub class: String,
    pub version: String,
    /// SHA-256 hash of the driver file, used for duplicate detection
    pub hash: String,
    /// Source path of the driver files
    pub source: String,
    pub platform: Vec<String>,
    pub os_version: Vec<String>,
    pub whql_signed: bool,
}
