//! Read-only queries against the share.
//!
//! `show` prints normalized snapshots as JSON and never mutates anything;
//! it is the query counterpart of `apply`.

use crate::Context;
use crate::cli::{ShowArgs, ShowKind};
use crate::config::Config;
use crate::resource::{application, operating_system, selection_profile, task_sequence};
use anyhow::{Context as AnyhowContext, Result, bail};
use mdtkit::{Backend, EntityKind, EntityRecord};
use serde_json::Value;

pub fn run(_ctx: &Context, args: &ShowArgs) -> Result<()> {
    let config = Config::load()?;
    let share = args
        .share
        .clone()
        .or_else(|| config.share_path.as_deref().map(Into::into))
        .context("no deployment share configured; pass --share or set share_path in the config")?;

    let backend = mdtkit::default_backend(&config.installation_path(), &share)?;
    let kind = entity_kind(args.kind);

    let records = match (&args.guid, &args.name) {
        (Some(guid), _) => match backend.find_by_guid(kind, guid)? {
            Some(record) => vec![record],
            None => bail!("{} not found: {guid}", kind.label()),
        },
        (None, Some(name)) => match backend.find_by_name(kind, name)? {
            Some(record) => vec![record],
            None => bail!("{} not found: {name}", kind.label()),
        },
        (None, None) => backend.list(kind)?,
    };

    let snapshots: Vec<Value> = records
        .iter()
        .map(|record| snapshot_value(&backend, kind, record))
        .collect::<Result<_>>()?;

    println!("{}", serde_json::to_string_pretty(&snapshots)?);
    Ok(())
}

fn entity_kind(kind: ShowKind) -> EntityKind {
    match kind {
        ShowKind::Applications => EntityKind::Application,
        ShowKind::OperatingSystems => EntityKind::OperatingSystem,
        ShowKind::Drivers => EntityKind::Driver,
        ShowKind::TaskSequences => EntityKind::TaskSequence,
        ShowKind::SelectionProfiles => EntityKind::SelectionProfile,
    }
}

fn snapshot_value<B: Backend>(
    backend: &B,
    kind: EntityKind,
    record: &EntityRecord,
) -> Result<Value> {
    let value = match kind {
        EntityKind::Application => serde_json::to_value(application::snapshot(record))?,
        EntityKind::OperatingSystem => {
            serde_json::to_value(operating_system::snapshot(record))?
        }
        EntityKind::TaskSequence => {
            serde_json::to_value(task_sequence::snapshot(backend, record))?
        }
        EntityKind::SelectionProfile => {
            serde_json::to_value(selection_profile::snapshot(record))?
        }
        // Drivers have no request schema; their records are the snapshot.
        EntityKind::Driver => serde_json::to_value(record)?,
    };
    Ok(value)
}
