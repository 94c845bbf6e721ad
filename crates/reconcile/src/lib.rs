//! # Reconcile
//!
//! A framework for idempotent resource reconciliation.
//!
//! This crate provides the core abstractions for converging externally
//! managed entities to a declared desired state: resolve which entity a
//! request targets, diff the request against the observed state, compute an
//! ordered operation plan, and apply it — or, in check mode, only report it.
//!
//! ## Core concepts
//!
//! - **EntityRef**: a target entity named by GUID, name, or both
//! - **DesiredState**: whether the entity should be present or absent
//! - **AttrMap**: the attribute bag the external system stores per entity,
//!   diffed with omitted-field-preserves-state semantics
//! - **ListEdit**: add/remove/set reconciliation for list-valued
//!   sub-resources
//! - **Plan**: the ordered primitive operations that close the gap
//! - **OpSink**: the single seam through which mutations reach the outside
//!
//! ## Example
//!
//! ```
//! use reconcile::{
//!     AttrMap, AttrValue, Observed, Op, OpSink, Result, RunMode,
//!     execute, plan_update,
//! };
//!
//! struct Recorder(Vec<Op>);
//!
//! impl OpSink for Recorder {
//!     fn apply(&mut self, op: &Op) -> Result<()> {
//!         self.0.push(op.clone());
//!         Ok(())
//!     }
//! }
//!
//! let mut current = AttrMap::new();
//! current.insert("Comments".into(), AttrValue::from("old"));
//! let paths = vec!["Applications".to_string()];
//!
//! let mut desired = AttrMap::new();
//! desired.insert("Comments".into(), AttrValue::from("updated"));
//!
//! let plan = plan_update(
//!     Observed { name: "7zip", attrs: &current, paths: &paths },
//!     None,
//!     &desired,
//!     None,
//!     None,
//! )?;
//! assert!(plan.changed());
//!
//! let mut sink = Recorder(Vec::new());
//! let applied = execute(&plan, RunMode::Apply, &mut sink);
//! assert_eq!(applied.performed, 1);
//! # Ok::<(), reconcile::Error>(())
//! ```

pub mod attrs;
pub mod edit;
pub mod error;
pub mod executor;
pub mod identity;
pub mod plan;
pub mod report;
pub mod state;

// Re-export main types at crate root
pub use attrs::{AttrMap, AttrValue, changed_attrs, supplied};
pub use edit::{ListEdit, ListSpec};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{Applied, OpSink, execute};
pub use identity::{EntityRef, is_guid, resolve};
pub use plan::{Observed, Op, Plan, plan_create, plan_delete, plan_update};
pub use report::Report;
pub use state::{DesiredState, RunMode};
