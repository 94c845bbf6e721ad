//! Plan execution.
//!
//! The executor is the only component that performs mutations, which is
//! what makes the check-mode guarantee mechanically checkable: a check run
//! returns before any [`OpSink::apply`] call. Operations run sequentially
//! and the first failure stops the run; there is no rollback, so a failed
//! run may leave the entity partially updated and the result says how far
//! it got.

use crate::error::{Error, Result};
use crate::plan::{Op, Plan};
use crate::state::RunMode;

/// Receiver for plan operations.
///
/// Implementations translate each primitive op into calls against the
/// external system, holding whatever handle the entity needs (kind, GUID,
/// share connection).
pub trait OpSink {
    fn apply(&mut self, op: &Op) -> Result<()>;
}

/// The outcome of running a plan.
#[derive(Debug)]
pub struct Applied {
    /// Operations actually performed
    pub performed: usize,
    /// Operations the plan contained
    pub total: usize,
    /// The failure that stopped the run, if any
    pub failure: Option<Error>,
}

impl Applied {
    /// Convert into a result, surfacing the stored failure.
    pub fn into_result(self) -> Result<usize> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.performed),
        }
    }
}

/// Run a plan against a sink.
///
/// In check mode nothing is applied and `performed` stays zero. Otherwise
/// operations run in order until one fails; already-applied operations
/// remain applied.
pub fn execute(plan: &Plan, mode: RunMode, sink: &mut dyn OpSink) -> Applied {
    let total = plan.len();

    if mode.is_check() || plan.is_empty() {
        return Applied {
            performed: 0,
            total,
            failure: None,
        };
    }

    for (index, op) in plan.ops.iter().enumerate() {
        log::debug!("applying operation {}/{}: {:?}", index + 1, total, op);
        if let Err(err) = sink.apply(op) {
            log::warn!(
                "operation {}/{} failed after {} applied: {}",
                index + 1,
                total,
                index,
                err
            );
            return Applied {
                performed: index,
                total,
                failure: Some(err),
            };
        }
    }

    Applied {
        performed: total,
        total,
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::AttrMap;

    /// Sink that records applied ops and can fail at a given index.
    struct RecordingSink {
        applied: Vec<Op>,
        fail_at: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                applied: Vec::new(),
                fail_at: None,
            }
        }

        fn failing_at(index: usize) -> Self {
            Self {
                applied: Vec::new(),
                fail_at: Some(index),
            }
        }
    }

    impl OpSink for RecordingSink {
        fn apply(&mut self, op: &Op) -> Result<()> {
            if self.fail_at == Some(self.applied.len()) {
                return Err(Error::backend("the snap-in rejected the call"));
            }
            self.applied.push(op.clone());
            Ok(())
        }
    }

    fn three_op_plan() -> Plan {
        Plan {
            ops: vec![
                Op::Rename { to: "new".into() },
                Op::SetAttrs {
                    attrs: AttrMap::new(),
                },
                Op::Link {
                    folder: "Applications\\Win11".into(),
                },
            ],
        }
    }

    #[test]
    fn test_check_mode_applies_nothing() {
        let mut sink = RecordingSink::new();
        let applied = execute(&three_op_plan(), RunMode::Check, &mut sink);

        assert_eq!(applied.performed, 0);
        assert_eq!(applied.total, 3);
        assert!(applied.failure.is_none());
        assert!(sink.applied.is_empty());
    }

    #[test]
    fn test_apply_runs_in_order() {
        let mut sink = RecordingSink::new();
        let plan = three_op_plan();
        let applied = execute(&plan, RunMode::Apply, &mut sink);

        assert_eq!(applied.performed, 3);
        assert_eq!(sink.applied, plan.ops);
        assert!(applied.into_result().is_ok());
    }

    #[test]
    fn test_first_failure_stops_and_reports_progress() {
        let mut sink = RecordingSink::failing_at(1);
        let applied = execute(&three_op_plan(), RunMode::Apply, &mut sink);

        assert_eq!(applied.performed, 1);
        assert_eq!(sink.applied.len(), 1);
        let err = applied.into_result().unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
    }

    #[test]
    fn test_empty_plan_is_noop() {
        let mut sink = RecordingSink::new();
        let applied = execute(&Plan::default(), RunMode::Apply, &mut sink);
        assert_eq!(applied.performed, 0);
        assert!(sink.applied.is_empty());
    }
}
