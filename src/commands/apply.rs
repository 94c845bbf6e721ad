//! The apply/plan commands.
//!
//! Both walk a request document entry by entry; `plan` runs everything in
//! check mode. A failing entry stops the run, since later entries may
//! depend on earlier ones (a task sequence on its operating system, an
//! import on its directory).

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs};
use crate::config::Config;
use crate::request::{Entry, Request};
use crate::resource::{
    application, dependency, deployment_share, directory, driver_import, operating_system,
    selection_profile, task_sequence,
};
use anyhow::{Context as AnyhowContext, Result, anyhow};
use colored::Colorize;
use mdtkit::Backend;
use reconcile::{Report, RunMode};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// The outcome of one document entry, erased for display.
#[derive(Debug, Serialize)]
struct EntryResult {
    kind: &'static str,
    subject: String,
    changed: bool,
    #[serde(flatten)]
    report: Value,
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mode = if args.check {
        RunMode::Check
    } else {
        RunMode::Apply
    };
    run_document(ctx, &args.file, args.share.as_deref(), mode, args.json)
}

pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<()> {
    run_document(
        ctx,
        &args.file,
        args.share.as_deref(),
        RunMode::Check,
        args.json,
    )
}

fn run_document(
    ctx: &Context,
    file: &Path,
    share_flag: Option<&Path>,
    mode: RunMode,
    json: bool,
) -> Result<()> {
    let config = Config::load()?;
    let request = Request::load(file)?;
    let share = share_path(share_flag, &request, &config)?;

    log::info!(
        "reconciling {} entries against {}",
        request.entries.len(),
        share.display()
    );
    let mut backend = mdtkit::default_backend(&config.installation_path(), &share)?;

    let mut results = Vec::new();
    let mut failure = None;
    for entry in &request.entries {
        match dispatch(&mut backend, entry, mode) {
            Ok(result) => {
                if !json && !ctx.quiet {
                    print_result(&result, mode);
                }
                results.push(result);
            }
            Err(err) => {
                failure = Some(anyhow!(err).context(format!(
                    "failed to reconcile {} {}",
                    entry.label(),
                    entry.subject()
                )));
                break;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if !ctx.quiet {
        let changed = results.iter().filter(|r| r.changed).count();
        println!();
        println!(
            "{} entries, {} changed{}",
            results.len(),
            changed,
            if mode.is_check() { " (check mode)" } else { "" }
        );
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Resolve the share the document applies to: CLI flag, then document,
/// then config file, then a share the document itself is creating.
fn share_path(flag: Option<&Path>, request: &Request, config: &Config) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = &request.share {
        return Ok(PathBuf::from(shellexpand::tilde(path).as_ref()));
    }
    if let Some(path) = &config.share_path {
        return Ok(PathBuf::from(shellexpand::tilde(path).as_ref()));
    }
    request
        .entries
        .iter()
        .find_map(|entry| match entry {
            Entry::DeploymentShare(opts) => opts.path.as_deref().map(PathBuf::from),
            _ => None,
        })
        .context("no deployment share configured; pass --share, set `share` in the document, or set share_path in the config")
}

fn dispatch<B: Backend>(backend: &mut B, entry: &Entry, mode: RunMode) -> reconcile::Result<EntryResult> {
    match entry {
        Entry::Application(opts) => {
            erase(entry, application::reconcile(backend, opts, mode)?)
        }
        Entry::ApplicationDependencies(opts) => {
            erase(entry, dependency::reconcile(backend, opts, mode)?)
        }
        Entry::OperatingSystem(opts) => {
            erase(entry, operating_system::reconcile(backend, opts, mode)?)
        }
        Entry::DriverImport(opts) => {
            erase(entry, driver_import::reconcile(backend, opts, mode)?)
        }
        Entry::TaskSequence(opts) => {
            erase(entry, task_sequence::reconcile(backend, opts, mode)?)
        }
        Entry::SelectionProfile(opts) => {
            erase(entry, selection_profile::reconcile(backend, opts, mode)?)
        }
        Entry::Directory(opts) => erase(entry, directory::reconcile(backend, opts, mode)?),
        Entry::DeploymentShare(opts) => {
            erase(entry, deployment_share::reconcile(backend, opts, mode)?)
        }
    }
}

fn erase<S: Serialize>(entry: &Entry, report: Report<S>) -> reconcile::Result<EntryResult> {
    let changed = report.changed;
    let value = serde_json::to_value(&report)
        .map_err(|e| reconcile::Error::backend(format!("unserializable report: {e}")))?;
    Ok(EntryResult {
        kind: entry.label(),
        subject: entry.subject(),
        changed,
        report: value,
    })
}

fn print_result(result: &EntryResult, mode: RunMode) {
    let symbol = if result.changed {
        if mode.is_check() { "~".yellow() } else { "~".green() }
    } else {
        "✓".green()
    };
    let note = if result.changed {
        if mode.is_check() { "would change" } else { "changed" }
    } else {
        "ok"
    };
    println!(
        "  {} {} {:<30} {}",
        symbol,
        result.kind,
        result.subject,
        note.dimmed()
    );
}
