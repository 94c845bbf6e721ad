//! Application dependency reconciliation.
//!
//! Dependencies are a list-valued sub-resource of an application: an
//! ordered list of other applications, stored by GUID. Requests may name
//! the referenced applications by GUID or name; every reference must
//! resolve before anything is written.

use mdtkit::{Backend, EntityKind, EntityOps};
use reconcile::{
    AttrMap, AttrValue, DesiredState, EntityRef, Error, ListEdit, ListSpec, Op, Plan, Report,
    Result, RunMode, execute,
};
use serde::{Deserialize, Serialize};

/// A reference to an application by GUID or name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppRef {
    pub guid: Option<String>,
    pub name: Option<String>,
}

/// Options for one dependency request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyOptions {
    pub guid: Option<String>,
    pub name: Option<String>,
    pub add: Option<Vec<AppRef>>,
    pub remove: Option<Vec<AppRef>>,
    pub set: Option<Vec<AppRef>>,
}

/// One resolved dependency, as reported back.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyEntry {
    pub guid: String,
    pub name: String,
}

/// The reported dependency list of an application.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySnapshot {
    pub application: DependencyEntry,
    pub application_dependencies: Vec<DependencyEntry>,
}

/// Reconcile an application's dependency list.
pub fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    opts: &DependencyOptions,
    mode: RunMode,
) -> Result<Report<DependencySnapshot>> {
    if opts.guid.is_some() && opts.name.is_some() {
        return Err(Error::validation("guid and name are mutually exclusive"));
    }
    let target = EntityRef::new(opts.guid.clone(), opts.name.clone());
    target.validate_for(DesiredState::Present)?;

    let edit_spec = ListSpec {
        add: opts.add.clone(),
        remove: opts.remove.clone(),
        set: opts.set.clone(),
    };
    let edit = edit_spec
        .into_edit("dependencies")?
        .ok_or_else(|| Error::validation("one of add, remove or set is required"))?;
    let edit = resolve_refs(backend, edit)?;

    let record = reconcile::resolve(
        &target,
        |guid| backend.find_by_guid(EntityKind::Application, guid),
        |name| backend.find_by_name(EntityKind::Application, name),
    )?
    .ok_or_else(|| Error::not_found("application", target.describe()))?;

    let current: Vec<String> = record
        .attr_list("Dependency")
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    let desired = edit.resolve(&current);

    if desired == current {
        return Ok(Report::unchanged(snapshot_of(backend, &record, &current)?));
    }

    let plan = Plan {
        ops: vec![Op::SetAttrs {
            attrs: AttrMap::from([(
                "Dependency".to_string(),
                AttrValue::List(desired.clone()),
            )]),
        }],
    };
    let mut sink = EntityOps::new(backend, EntityKind::Application, Some(record.guid.clone()));
    let applied = execute(&plan, mode, &mut sink);
    if let Some(failure) = applied.failure {
        return Err(failure);
    }

    Ok(Report::changed(snapshot_of(backend, &record, &desired)?))
}

/// Resolve every referenced application to its GUID.
fn resolve_refs<B: Backend + ?Sized>(
    backend: &B,
    edit: ListEdit<AppRef>,
) -> Result<ListEdit<String>> {
    let resolve_all = |refs: Vec<AppRef>| -> Result<Vec<String>> {
        refs.into_iter()
            .map(|app_ref| {
                let target = EntityRef::new(app_ref.guid.clone(), app_ref.name.clone());
                if app_ref.guid.is_some() && app_ref.name.is_some() {
                    return Err(Error::validation(
                        "a dependency reference takes guid or name, not both",
                    ));
                }
                target.validate_for(DesiredState::Present)?;
                let found = reconcile::resolve(
                    &target,
                    |guid| backend.find_by_guid(EntityKind::Application, guid),
                    |name| backend.find_by_name(EntityKind::Application, name),
                )?;
                found
                    .map(|r| r.guid)
                    .ok_or_else(|| Error::not_found("application", target.describe()))
            })
            .collect()
    };

    Ok(match edit {
        ListEdit::Set(refs) => ListEdit::Set(resolve_all(refs)?),
        ListEdit::Add(refs) => ListEdit::Add(resolve_all(refs)?),
        ListEdit::Remove(refs) => ListEdit::Remove(resolve_all(refs)?),
    })
}

fn snapshot_of<B: Backend + ?Sized>(
    backend: &B,
    record: &mdtkit::EntityRecord,
    dependencies: &[String],
) -> Result<DependencySnapshot> {
    let entries = dependencies
        .iter()
        .map(|guid| {
            backend
                .find_by_guid(EntityKind::Application, guid)?
                .map(|r| DependencyEntry {
                    guid: r.guid,
                    name: r.name,
                })
                .ok_or_else(|| Error::not_found("application", guid.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DependencySnapshot {
        application: DependencyEntry {
            guid: record.guid.clone(),
            name: record.name.clone(),
        },
        application_dependencies: entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::application::{self, AppType, ApplicationOptions};
    use mdtkit::MemoryBackend;

    fn seed_app(backend: &mut MemoryBackend, short_name: &str) -> String {
        let opts = ApplicationOptions {
            app_type: Some(AppType::NoSource),
            short_name: Some(short_name.into()),
            command_line: Some("setup.exe /S".into()),
            ..Default::default()
        };
        application::reconcile(backend, &opts, RunMode::Apply)
            .unwrap()
            .entity
            .unwrap()
            .guid
    }

    #[test]
    fn test_set_dependencies_by_name() {
        let mut backend = MemoryBackend::new();
        seed_app(&mut backend, "Application 1");
        let dep1 = seed_app(&mut backend, "Dependency 1");
        seed_app(&mut backend, "Dependency 2");

        let opts = DependencyOptions {
            name: Some("Application 1".into()),
            set: Some(vec![
                AppRef {
                    name: Some("Dependency 1".into()),
                    ..Default::default()
                },
                AppRef {
                    name: Some("Dependency 2".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(report.changed);
        let snapshot = report.entity.unwrap();
        assert_eq!(snapshot.application_dependencies.len(), 2);
        assert_eq!(snapshot.application_dependencies[0].guid, dep1);

        // Second identical run converges.
        let again = reconcile(&mut backend, &opts, RunMode::Apply).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_add_then_remove_restores_original() {
        let mut backend = MemoryBackend::new();
        seed_app(&mut backend, "Application 1");
        seed_app(&mut backend, "Dependency 1");

        let add = DependencyOptions {
            name: Some("Application 1".into()),
            add: Some(vec![AppRef {
                name: Some("Dependency 1".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(reconcile(&mut backend, &add, RunMode::Apply).unwrap().changed);

        let remove = DependencyOptions {
            name: Some("Application 1".into()),
            remove: Some(vec![AppRef {
                name: Some("Dependency 1".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let report = reconcile(&mut backend, &remove, RunMode::Apply).unwrap();
        assert!(report.changed);
        assert!(report.entity.unwrap().application_dependencies.is_empty());
    }

    #[test]
    fn test_unresolved_reference_fails_before_write() {
        let mut backend = MemoryBackend::new();
        seed_app(&mut backend, "Application 1");
        let mutations = backend.mutations();

        let opts = DependencyOptions {
            name: Some("Application 1".into()),
            add: Some(vec![AppRef {
                name: Some("No Such App".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let err = reconcile(&mut backend, &opts, RunMode::Apply).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(backend.mutations(), mutations);
    }

    #[test]
    fn test_set_exclusive_with_add() {
        let mut backend = MemoryBackend::new();
        let opts = DependencyOptions {
            name: Some("Application 1".into()),
            add: Some(vec![AppRef::default()]),
            set: Some(vec![AppRef::default()]),
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&mut backend, &opts, RunMode::Apply),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_check_mode_writes_nothing() {
        let mut backend = MemoryBackend::new();
        seed_app(&mut backend, "Application 1");
        seed_app(&mut backend, "Dependency 1");
        let mutations = backend.mutations();

        let opts = DependencyOptions {
            name: Some("Application 1".into()),
            add: Some(vec![AppRef {
                name: Some("Dependency 1".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let report = reconcile(&mut backend, &opts, RunMode::Check).unwrap();
        assert!(report.changed);
        assert_eq!(backend.mutations(), mutations);
    }
}
