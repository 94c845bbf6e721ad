//! Request documents.
//!
//! A request document is a YAML file declaring the desired state of one or
//! more share entities. Entries are applied in document order, so a
//! document can create a directory, import an operating system into it,
//! and then build a task sequence on top.

use crate::resource::application::ApplicationOptions;
use crate::resource::dependency::DependencyOptions;
use crate::resource::deployment_share::DeploymentShareOptions;
use crate::resource::directory::DirectoryOptions;
use crate::resource::driver_import::DriverImportOptions;
use crate::resource::operating_system::OperatingSystemOptions;
use crate::resource::selection_profile::SelectionProfileOptions;
use crate::resource::task_sequence::TaskSequenceOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A parsed request document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// Deployment share the entries apply to; overrides the config file
    pub share: Option<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// One desired-state declaration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Application(ApplicationOptions),
    ApplicationDependencies(DependencyOptions),
    OperatingSystem(OperatingSystemOptions),
    DriverImport(DriverImportOptions),
    TaskSequence(TaskSequenceOptions),
    SelectionProfile(SelectionProfileOptions),
    Directory(DirectoryOptions),
    DeploymentShare(DeploymentShareOptions),
}

impl Entry {
    /// The entity kind, for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Application(_) => "application",
            Self::ApplicationDependencies(_) => "application dependencies",
            Self::OperatingSystem(_) => "operating system",
            Self::DriverImport(_) => "driver import",
            Self::TaskSequence(_) => "task sequence",
            Self::SelectionProfile(_) => "selection profile",
            Self::Directory(_) => "directory",
            Self::DeploymentShare(_) => "deployment share",
        }
    }

    /// What the entry addresses, for display.
    pub fn subject(&self) -> String {
        fn pick(first: &Option<String>, second: &Option<String>) -> String {
            first
                .clone()
                .or_else(|| second.clone())
                .unwrap_or_else(|| "<unnamed>".to_string())
        }
        match self {
            Self::Application(o) => pick(&o.name, &o.short_name),
            Self::ApplicationDependencies(o) => pick(&o.name, &o.guid),
            Self::OperatingSystem(o) => pick(&o.name, &o.guid),
            Self::DriverImport(o) => o.path.clone(),
            Self::TaskSequence(o) => pick(&o.id, &o.name),
            Self::SelectionProfile(o) => pick(&o.name, &o.guid),
            Self::Directory(o) => o.path.clone(),
            Self::DeploymentShare(o) => pick(&o.path, &o.name),
        }
    }
}

impl Request {
    /// Load and parse a request document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid request document: {}", path.display()))
    }
}
