//! Real toolkit backend using the MDT PowerShell snap-in.
//!
//! Every call shells out to `powershell.exe` with a preamble that imports
//! the toolkit module and mounts the deployment share as a PSDrive. Items
//! are read with `Get-ChildItem` over the kind's root folder and grouped by
//! GUID, since the provider exposes one tree node per logical folder the
//! item appears in.

use crate::backend::Backend;
use crate::digest::{self, FileDigest};
use crate::types::{DriverRecord, EntityKind, EntityRecord, ShareCreated, ShareRecord};
use reconcile::{AttrMap, AttrValue, Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

const DRIVE: &str = "DS001";
const MODULE_RELATIVE: &str = "bin\\MicrosoftDeploymentToolkit.psd1";

/// Backend that executes real snap-in commands through PowerShell.
pub struct PowerShellBackend {
    powershell: String,
    installation_path: PathBuf,
    share_path: PathBuf,
}

impl PowerShellBackend {
    /// Create a backend for one share.
    ///
    /// Returns an error if no PowerShell executable is on the PATH.
    pub fn new(installation_path: &Path, share_path: &Path) -> Result<Self> {
        let powershell = find_powershell()?;
        Ok(Self {
            powershell,
            installation_path: installation_path.to_path_buf(),
            share_path: share_path.to_path_buf(),
        })
    }

    fn preamble(&self) -> String {
        let module = self.installation_path.join(MODULE_RELATIVE);
        format!(
            "Import-Module {} | Out-Null; \
             New-PSDrive -Name {DRIVE} -PSProvider MDTProvider -Root {} | Out-Null; ",
            quote(&module.display().to_string()),
            quote(&self.share_path.display().to_string()),
        )
    }

    /// Run a script in the share's session and return stdout.
    fn run(&self, script: &str) -> Result<String> {
        let full = format!("{}{script}", self.preamble());
        log::debug!("powershell: {script}");
        let output = Command::new(&self.powershell)
            .args(["-NoProfile", "-NonInteractive", "-Command", &full])
            .output()
            .map_err(|e| Error::backend(format!("failed to execute powershell: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::backend(format!(
                "the snap-in rejected the call: {}",
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a script whose output is piped through `ConvertTo-Json`.
    fn run_json(&self, script: &str) -> Result<Value> {
        let stdout = self.run(script)?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed)
            .map_err(|e| Error::backend(format!("unparseable snap-in output: {e}")))
    }

    fn item_path(&self, kind: EntityKind, guid: &str) -> Result<String> {
        let record = self
            .find_by_guid(kind, guid)?
            .ok_or_else(|| Error::not_found(kind.label(), guid))?;
        let folder = record
            .paths
            .first()
            .ok_or_else(|| Error::backend(format!("{} {guid} has no path", kind.label())))?;
        Ok(format!("{DRIVE}:\\{folder}\\{}", record.name))
    }
}

impl Backend for PowerShellBackend {
    fn is_available(&self) -> bool {
        self.run("Get-PSDrive -Name DS001 | Out-Null").is_ok()
    }

    fn find_by_guid(&self, kind: EntityKind, guid: &str) -> Result<Option<EntityRecord>> {
        Ok(self
            .list(kind)?
            .into_iter()
            .find(|r| r.guid.eq_ignore_ascii_case(guid)))
    }

    fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>> {
        Ok(self.list(kind)?.into_iter().find(|r| r.name == name))
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let script = format!(
            "Get-ChildItem -Path {} -Recurse | \
             Where-Object {{ -not $_.PSIsContainer }} | \
             Select-Object -Property * | ConvertTo-Json -Depth 4",
            quote(&format!("{DRIVE}:\\{}", kind.root_folder())),
        );
        let value = self.run_json(&script)?;
        Ok(group_items(&value, kind))
    }

    fn create(
        &mut self,
        kind: EntityKind,
        folder: &str,
        name: &str,
        attrs: &AttrMap,
    ) -> Result<EntityRecord> {
        let path = quote(&format!("{DRIVE}:\\{folder}"));
        let script = match kind {
            EntityKind::Application => {
                let mut cmd = format!(
                    "Import-MDTApplication -Path {path} -Name {} -Enable 'True'",
                    quote(name)
                );
                if let Some(source) = attrs.get("Source").and_then(|v| v.as_str()) {
                    cmd.push_str(&format!(
                        " -ApplicationSourcePath {} -DestinationFolder {}",
                        quote(source),
                        quote(
                            attrs
                                .get("DestinationFolder")
                                .and_then(|v| v.as_str())
                                .unwrap_or(name)
                        ),
                    ));
                } else if attrs.get("CommandLine").is_some() {
                    cmd.push_str(" -NoSource");
                } else {
                    cmd.push_str(" -Bundle");
                }
                if let Some(command_line) = attrs.get("CommandLine").and_then(|v| v.as_str()) {
                    cmd.push_str(&format!(" -CommandLine {}", quote(command_line)));
                }
                if let Some(working_dir) = attrs.get("WorkingDirectory").and_then(|v| v.as_str())
                {
                    cmd.push_str(&format!(" -WorkingDirectory {}", quote(working_dir)));
                }
                cmd
            }
            EntityKind::OperatingSystem => format!(
                "Import-MDTOperatingSystem -Path {path} -SourcePath {} -DestinationFolder {}",
                quote(attrs.get("Source").and_then(|v| v.as_str()).unwrap_or("")),
                quote(
                    attrs
                        .get("DestinationFolder")
                        .and_then(|v| v.as_str())
                        .unwrap_or(name)
                ),
            ),
            EntityKind::TaskSequence => format!(
                "Import-MDTTaskSequence -Path {path} -Name {} -ID {} -Template {} \
                 -OperatingSystem (Get-ChildItem -Path {} -Recurse | \
                 Where-Object {{ $_.guid -eq {} }})",
                quote(name),
                quote(attrs.get("ID").and_then(|v| v.as_str()).unwrap_or("")),
                quote(
                    attrs
                        .get("TaskSequenceTemplate")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Client.xml")
                ),
                quote(&format!(
                    "{DRIVE}:\\{}",
                    EntityKind::OperatingSystem.root_folder()
                )),
                quote(
                    attrs
                        .get("OperatingSystemGuid")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                ),
            ),
            EntityKind::SelectionProfile => format!(
                "New-Item -Path {} -Name {} -Definition {} -ReadOnly 'False' | Out-Null",
                path,
                quote(name),
                quote(&definition_xml(
                    attrs.get("Definition").and_then(|v| v.as_list()).unwrap_or(&[])
                )),
            ),
            EntityKind::Driver => {
                return Err(Error::backend(
                    "drivers are created through import, not item creation",
                ));
            }
        };
        self.run(&script)?;

        let record = self
            .find_by_name(kind, name)?
            .ok_or_else(|| Error::backend(format!("{} vanished after create", kind.label())))?;
        // Import cmdlets only accept a subset of properties; the rest are
        // written afterwards. Type is implied by the import switches and is
        // not a provider property.
        let remaining: AttrMap = attrs
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "Source" | "DestinationFolder" | "Type"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !remaining.is_empty() {
            self.set_attrs(kind, &record.guid, &remaining)?;
        }
        self.find_by_guid(kind, &record.guid)?
            .ok_or_else(|| Error::backend(format!("{} vanished after create", kind.label())))
    }

    fn set_attrs(&mut self, kind: EntityKind, guid: &str, attrs: &AttrMap) -> Result<()> {
        let item = self.item_path(kind, guid)?;
        let mut script = String::new();
        for (key, value) in attrs {
            let rendered = match value {
                AttrValue::List(items) if key == "Definition" => definition_xml(items),
                other => other.render(),
            };
            script.push_str(&format!(
                "Set-ItemProperty -Path {} -Name {} -Value {}; ",
                quote(&item),
                quote(key),
                quote(&rendered),
            ));
        }
        self.run(&script)?;
        Ok(())
    }

    fn rename(&mut self, kind: EntityKind, guid: &str, to: &str) -> Result<()> {
        let item = self.item_path(kind, guid)?;
        self.run(&format!(
            "Rename-Item -Path {} -NewName {}",
            quote(&item),
            quote(to)
        ))?;
        Ok(())
    }

    fn link(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()> {
        let item = self.item_path(kind, guid)?;
        self.run(&format!(
            "Copy-Item -Path {} -Destination {}",
            quote(&item),
            quote(&format!("{DRIVE}:\\{folder}")),
        ))?;
        Ok(())
    }

    fn unlink(&mut self, kind: EntityKind, guid: &str, folder: &str) -> Result<()> {
        let record = self
            .find_by_guid(kind, guid)?
            .ok_or_else(|| Error::not_found(kind.label(), guid))?;
        self.run(&format!(
            "Remove-Item -Path {}",
            quote(&format!("{DRIVE}:\\{folder}\\{}", record.name)),
        ))?;
        Ok(())
    }

    fn delete(&mut self, kind: EntityKind, guid: &str) -> Result<()> {
        let record = self
            .find_by_guid(kind, guid)?
            .ok_or_else(|| Error::not_found(kind.label(), guid))?;
        for folder in &record.paths {
            self.run(&format!(
                "Remove-Item -Path {} -Force",
                quote(&format!("{DRIVE}:\\{folder}\\{}", record.name)),
            ))?;
        }
        Ok(())
    }

    fn stage_files(&mut self, kind: EntityKind, guid: &str, source: &Path) -> Result<()> {
        let record = self
            .find_by_guid(kind, guid)?
            .ok_or_else(|| Error::not_found(kind.label(), guid))?;
        let files_path = record
            .attr_str("Source")
            .ok_or_else(|| Error::backend(format!("{} {guid} has no file payload", kind.label())))?;
        let destination = resolve_share_relative(&self.share_path, files_path);
        self.run(&format!(
            "Remove-Item -Path {} -Recurse -Force -ErrorAction SilentlyContinue; \
             Copy-Item -Path {} -Destination {} -Recurse",
            quote(&destination.display().to_string()),
            quote(&format!("{}\\*", source.display())),
            quote(&destination.display().to_string()),
        ))?;
        Ok(())
    }

    fn staged_files(&self, kind: EntityKind, guid: &str) -> Result<Vec<FileDigest>> {
        let Some(record) = self.find_by_guid(kind, guid)? else {
            return Ok(Vec::new());
        };
        let Some(files_path) = record.attr_str("Source") else {
            return Ok(Vec::new());
        };
        let destination = resolve_share_relative(&self.share_path, files_path);
        if !destination.exists() {
            return Ok(Vec::new());
        }
        digest::digest_tree(&destination)
    }

    fn directory_exists(&self, path: &str) -> Result<bool> {
        let output = self.run(&format!(
            "Test-Path -Path {}",
            quote(&format!("{DRIVE}:\\{path}")),
        ))?;
        Ok(output.trim().eq_ignore_ascii_case("true"))
    }

    fn create_directory(&mut self, path: &str) -> Result<()> {
        self.run(&format!(
            "New-Item -Path {} -ItemType Directory | Out-Null",
            quote(&format!("{DRIVE}:\\{path}")),
        ))?;
        Ok(())
    }

    fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.run(&format!(
            "Remove-Item -Path {} -Recurse -Force",
            quote(&format!("{DRIVE}:\\{path}")),
        ))?;
        Ok(())
    }

    fn driver_hashes(&self) -> Result<HashSet<String>> {
        let script = format!(
            "Get-ChildItem -Path {} -Recurse | \
             Where-Object {{ -not $_.PSIsContainer }} | \
             Select-Object -ExpandProperty Hash | ConvertTo-Json",
            quote(&format!("{DRIVE}:\\{}", EntityKind::Driver.root_folder())),
        );
        let value = self.run_json(&script)?;
        let hashes = match value {
            Value::String(one) => HashSet::from([one]),
            Value::Array(many) => many
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => HashSet::new(),
        };
        Ok(hashes)
    }

    fn import_drivers(
        &mut self,
        sources: &[PathBuf],
        folder: &str,
        import_duplicates: bool,
    ) -> Result<Vec<DriverRecord>> {
        let known = if import_duplicates {
            HashSet::new()
        } else {
            self.driver_hashes()?
        };

        let source_list = sources
            .iter()
            .map(|p| quote(&p.display().to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut script = format!(
            "Import-MDTDriver -Path {} -SourcePath @({source_list})",
            quote(&format!("{DRIVE}:\\{folder}")),
        );
        if import_duplicates {
            script.push_str(" -ImportDuplicates");
        }
        script.push_str(" | Select-Object -Property * | ConvertTo-Json -Depth 4");

        let value = self.run_json(&script)?;
        let imported = as_array(&value)
            .iter()
            .filter_map(|item| driver_from_json(item))
            .filter(|d| import_duplicates || !known.contains(&d.hash))
            .collect();
        Ok(imported)
    }

    fn find_share_by_name(&self, name: &str) -> Result<Option<ShareRecord>> {
        Ok(self
            .list_shares()?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    fn find_share_by_path(&self, path: &Path) -> Result<Option<ShareRecord>> {
        Ok(self.list_shares()?.into_iter().find(|s| s.path == path))
    }

    fn create_share(
        &mut self,
        path: &Path,
        description: &str,
        share_name: &str,
    ) -> Result<ShareCreated> {
        let directory_created = !path.exists();
        let next = self.list_shares()?.len() + 1;
        let drive = format!("DS{next:03}");
        self.run(&format!(
            "if (-not (Test-Path -Path {path_q})) {{ New-Item -Path {path_q} -ItemType Directory | Out-Null }}; \
             New-SmbShare -Name {share_q} -Path {path_q} -FullAccess 'Administrators' | Out-Null; \
             New-PSDrive -Name {drive} -PSProvider MDTProvider -Root {path_q} \
             -Description {desc_q} -NetworkPath {unc_q} | Add-MDTPersistentDrive | Out-Null",
            path_q = quote(&path.display().to_string()),
            share_q = quote(share_name),
            desc_q = quote(description),
            unc_q = quote(&format!("\\\\localhost\\{share_name}")),
        ))?;
        Ok(ShareCreated {
            record: ShareRecord {
                name: drive,
                path: path.to_path_buf(),
                description: description.to_string(),
                share_name: share_name.to_string(),
            },
            directory_created,
        })
    }

    fn update_share(
        &mut self,
        name: &str,
        description: Option<&str>,
        share_name: Option<&str>,
    ) -> Result<()> {
        let share = self
            .find_share_by_name(name)?
            .ok_or_else(|| Error::not_found("deployment share", name))?;
        if let Some(description) = description {
            self.run(&format!(
                "Set-ItemProperty -Path {} -Name Description -Value {}",
                quote(&format!("{name}:")),
                quote(description),
            ))?;
        }
        if let Some(new_share) = share_name {
            self.run(&format!(
                "Remove-SmbShare -Name {} -Force; \
                 New-SmbShare -Name {} -Path {} -FullAccess 'Administrators' | Out-Null",
                quote(&share.share_name),
                quote(new_share),
                quote(&share.path.display().to_string()),
            ))?;
        }
        Ok(())
    }

    fn remove_share(&mut self, name: &str) -> Result<()> {
        self.run(&format!(
            "Remove-MDTPersistentDrive -Name {} | Out-Null",
            quote(name),
        ))?;
        Ok(())
    }
}

impl PowerShellBackend {
    fn list_shares(&self) -> Result<Vec<ShareRecord>> {
        let value = self.run_json(
            "Get-MDTPersistentDrive | Select-Object -Property * | ConvertTo-Json -Depth 3",
        )?;
        Ok(as_array(&value)
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                Some(ShareRecord {
                    name: str_field(obj, "Name")?,
                    path: PathBuf::from(str_field(obj, "Path")?),
                    description: str_field(obj, "Description").unwrap_or_default(),
                    share_name: str_field(obj, "NetworkPath")
                        .unwrap_or_default()
                        .rsplit('\\')
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect())
    }
}

/// Locate a PowerShell executable.
fn find_powershell() -> Result<String> {
    for candidate in ["powershell.exe", "powershell", "pwsh"] {
        let found = Command::new(candidate)
            .args(["-NoProfile", "-Command", "$PSVersionTable.PSVersion.Major"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if found {
            return Ok(candidate.to_string());
        }
    }
    Err(Error::backend(
        "PowerShell not found; the deployment toolkit requires it",
    ))
}

/// Single-quote a value for PowerShell, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render selection-profile definition paths as the provider's XML blob.
fn definition_xml(paths: &[String]) -> String {
    let includes = paths
        .iter()
        .map(|p| format!("<Include path=\"{p}\" />"))
        .collect::<Vec<_>>()
        .join("");
    format!("<SelectionProfile>{includes}</SelectionProfile>")
}

/// Parse the provider's definition XML back into a path list.
fn definition_paths(xml: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("path=\"") {
        rest = &rest[start + 6..];
        let Some(end) = rest.find('"') else { break };
        paths.push(rest[..end].to_string());
        rest = &rest[end + 1..];
    }
    paths
}

fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        single => vec![single.clone()],
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Group provider tree nodes by GUID into one record per item.
fn group_items(value: &Value, kind: EntityKind) -> Vec<EntityRecord> {
    let mut grouped: BTreeMap<String, EntityRecord> = BTreeMap::new();

    for item in as_array(value) {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(guid) = str_field(obj, "guid") else {
            continue;
        };
        let Some(name) = str_field(obj, "Name") else {
            continue;
        };
        let folder = str_field(obj, "PSParentPath")
            .map(|p| folder_from_pspath(&p, kind))
            .unwrap_or_else(|| kind.root_folder().to_string());

        let entry = grouped.entry(guid.clone()).or_insert_with(|| EntityRecord {
            guid,
            name,
            attrs: attrs_from_json(obj),
            paths: Vec::new(),
        });
        if !entry.paths.contains(&folder) {
            entry.paths.push(folder);
        }
    }

    grouped.into_values().collect()
}

/// Strip the provider and drive prefix from a PSPath, e.g.
/// `MicrosoftDeploymentToolkit\MDTProvider::DS001:\Applications\Win11`
/// becomes `Applications\Win11`.
fn folder_from_pspath(pspath: &str, kind: EntityKind) -> String {
    let after_provider = pspath.rsplit("::").next().unwrap_or(pspath);
    let after_drive = after_provider
        .split_once(":\\")
        .map(|(_, rest)| rest)
        .unwrap_or(after_provider);
    if after_drive.is_empty() {
        kind.root_folder().to_string()
    } else {
        after_drive.to_string()
    }
}

/// Convert a provider item's JSON fields into an attribute bag.
fn attrs_from_json(obj: &serde_json::Map<String, Value>) -> AttrMap {
    let mut attrs = AttrMap::new();
    for (key, value) in obj {
        if key.starts_with("PS") || key == "Name" || key == "guid" {
            continue;
        }
        let attr = match value {
            Value::Bool(v) => Some(AttrValue::Bool(*v)),
            Value::Number(v) => v.as_i64().map(AttrValue::Int),
            Value::String(v) if key == "Definition" => {
                Some(AttrValue::List(definition_paths(v)))
            }
            Value::String(v) => Some(match v.as_str() {
                "True" => AttrValue::Bool(true),
                "False" => AttrValue::Bool(false),
                _ => AttrValue::Str(v.clone()),
            }),
            Value::Array(items) => Some(AttrValue::List(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )),
            _ => None,
        };
        if let Some(attr) = attr {
            attrs.insert(key.clone(), attr);
        }
    }
    attrs
}

fn driver_from_json(item: &Value) -> Option<DriverRecord> {
    let obj = item.as_object()?;
    Some(DriverRecord {
        guid: str_field(obj, "guid")?,
        name: str_field(obj, "Name")?,
        class: str_field(obj, "Class").unwrap_or_default(),
        version: str_field(obj, "Version").unwrap_or_default(),
        hash: str_field(obj, "Hash").unwrap_or_default(),
        source: str_field(obj, "Source").unwrap_or_default(),
        platform: obj
            .get("Platform")
            .map(|v| {
                as_array(v)
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        os_version: obj
            .get("OSVersion")
            .map(|v| {
                as_array(v)
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        whql_signed: obj
            .get("WHQLSigned")
            .and_then(|v| v.as_str())
            .map(|v| v == "True")
            .unwrap_or(false),
    })
}

/// Resolve a share-relative payload path like `.\Applications\7zip 24.09`.
fn resolve_share_relative(share_path: &Path, files_path: &str) -> PathBuf {
    if let Some(relative) = files_path.strip_prefix(".\\") {
        share_path.join(relative)
    } else {
        PathBuf::from(files_path)
    }
}
