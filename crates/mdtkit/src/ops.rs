//! Bridges plan operations onto a backend.

use crate::backend::Backend;
use crate::types::{EntityKind, EntityRecord};
use reconcile::{Error, Op, OpSink, Result};

/// An [`OpSink`] that applies one entity's plan against a backend.
///
/// The sink tracks the entity handle across operations: a `Create` op
/// stores the GUID the backend generated so subsequent ops in the same
/// plan address the new item.
pub struct EntityOps<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    kind: EntityKind,
    guid: Option<String>,
    created: Option<EntityRecord>,
}

impl<'a, B: Backend + ?Sized> EntityOps<'a, B> {
    /// Create a sink for an existing entity (or `None` before creation).
    pub fn new(backend: &'a mut B, kind: EntityKind, guid: Option<String>) -> Self {
        Self {
            backend,
            kind,
            guid,
            created: None,
        }
    }

    /// The entity's GUID, if known.
    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }

    /// The record returned by a `Create` op, if one ran.
    pub fn created(&self) -> Option<&EntityRecord> {
        self.created.as_ref()
    }

    fn require_guid(&self) -> Result<&str> {
        self.guid
            .as_deref()
            .ok_or_else(|| Error::backend("no entity handle for operation"))
    }
}

impl<B: Backend + ?Sized> OpSink for EntityOps<'_, B> {
    fn apply(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::Create {
                name,
                folder,
                attrs,
            } => {
                let record = self.backend.create(self.kind, folder, name, attrs)?;
                self.guid = Some(record.guid.clone());
                self.created = Some(record);
                Ok(())
            }
            Op::Rename { to } => {
                let guid = self.require_guid()?.to_string();
                self.backend.rename(self.kind, &guid, to)
            }
            Op::SetAttrs { attrs } => {
                let guid = self.require_guid()?.to_string();
                self.backend.set_attrs(self.kind, &guid, attrs)
            }
            Op::Link { folder } => {
                let guid = self.require_guid()?.to_string();
                self.backend.link(self.kind, &guid, folder)
            }
            Op::Unlink { folder } => {
                let guid = self.require_guid()?.to_string();
                self.backend.unlink(self.kind, &guid, folder)
            }
            Op::StageFiles { source } => {
                let guid = self.require_guid()?.to_string();
                self.backend.stage_files(self.kind, &guid, source)
            }
            Op::Delete => {
                let guid = self.require_guid()?.to_string();
                self.backend.delete(self.kind, &guid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use reconcile::AttrMap;

    #[test]
    fn test_create_captures_handle_for_later_ops() {
        let mut backend = MemoryBackend::new();
        let mut sink = EntityOps::new(&mut backend, EntityKind::Application, None);

        sink.apply(&Op::Create {
            name: "7zip 24.09".into(),
            folder: "Applications".into(),
            attrs: AttrMap::new(),
        })
        .unwrap();
        sink.apply(&Op::Link {
            folder: "Applications\\Win11".into(),
        })
        .unwrap();

        let guid = sink.guid().unwrap().to_string();
        let record = backend
            .find_by_guid(EntityKind::Application, &guid)
            .unwrap()
            .unwrap();
        assert_eq!(record.paths, vec!["Applications", "Applications\\Win11"]);
    }

    #[test]
    fn test_op_without_handle_fails() {
        let mut backend = MemoryBackend::new();
        let mut sink = EntityOps::new(&mut backend, EntityKind::Application, None);
        let err = sink.apply(&Op::Delete).unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
    }
}
