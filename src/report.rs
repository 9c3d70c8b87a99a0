//! This module contains the side information accumulated during an analysis
//! run and read by downstream consumers once the run completes.
//!
//! Everything here is write-only from the engine's point of view: flags are
//! set monotonically and never cleared, and violations are appended, never
//! retracted. An aborted run leaves the report partially filled; consumers
//! must treat absent facts as "unknown", never as "proven safe".

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::container, state::MemoryState};

/// A contract violation discovered at some instruction.
///
/// Violations are diagnostics, not engine failures: interpretation continues
/// past them with the state narrowed as if the violated contract held.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Violation {
    #[error("A possibly-null value is dereferenced{}", if *certain { " (provably null)" } else { "" })]
    PossiblyNullDereference {
        /// Whether the value was provably null rather than merely possibly
        /// null.
        certain: bool,
    },

    #[error(
        "Argument {position} may be null but the callee requires it not to be{}",
        if *certain { " (provably null)" } else { "" }
    )]
    ArgumentMustNotBeNull { position: usize, certain: bool },

    #[error("An array is created with a possibly-negative size{}", if *certain { " (provably negative)" } else { "" })]
    PossiblyNegativeArraySize { certain: bool },
}

/// A violation with its location in the instruction program.
pub type LocatedViolation = container::Located<Violation>;

/// The sticky reachability record for one branching instruction.
///
/// Both flags start unset and are set monotonically as edges are taken; an
/// edge whose narrowed state became bottom leaves its flag unset, which is
/// what makes always-true/always-false reporting possible.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BranchRecord {
    /// Whether the true edge was ever taken.
    pub true_taken: bool,

    /// Whether the false edge was ever taken.
    pub false_taken: bool,
}

/// The accumulated side data of one analysis run.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Per-branch sticky reachability flags, keyed by instruction index.
    branches: HashMap<u32, BranchRecord>,

    /// The contract violations discovered, sorted by location.
    violations: container::Errors<LocatedViolation>,

    /// Call sites proven side-effect free.
    pure_calls: BTreeSet<u32>,

    /// Dereference sites and whether every state reaching them carried a
    /// provably non-null operand.
    dereferences: BTreeMap<u32, bool>,

    /// The states archived at normal method exits.
    exit_states: Vec<MemoryState>,

    /// The states archived at exceptional exits with no in-method handler.
    exceptional_exits: Vec<MemoryState>,
}

impl Report {
    /// Constructs a new, empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the branch at `index` took its true or false edge.
    pub fn mark_branch(&mut self, index: u32, took_true_edge: bool) {
        let record = self.branches.entry(index).or_default();
        if took_true_edge {
            record.true_taken = true;
        } else {
            record.false_taken = true;
        }
    }

    /// Gets the reachability record for the branch at `index`, if the branch
    /// was ever reached.
    #[must_use]
    pub fn branch(&self, index: u32) -> Option<BranchRecord> {
        self.branches.get(&index).copied()
    }

    /// Checks whether the branch at `index` was reached and only ever took
    /// its true edge.
    #[must_use]
    pub fn branch_always_true(&self, index: u32) -> bool {
        self.branch(index)
            .is_some_and(|r| r.true_taken && !r.false_taken)
    }

    /// Checks whether the branch at `index` was reached and only ever took
    /// its false edge.
    #[must_use]
    pub fn branch_always_false(&self, index: u32) -> bool {
        self.branch(index)
            .is_some_and(|r| r.false_taken && !r.true_taken)
    }

    /// Records a contract violation at `index`.
    pub fn report_violation(&mut self, index: u32, violation: Violation) {
        self.violations.add_located(index, violation);
    }

    /// Gets the recorded violations, sorted by location.
    #[must_use]
    pub fn violations(&self) -> &[LocatedViolation] {
        self.violations.payloads()
    }

    /// Records that the call at `index` was dispatched as side-effect free.
    pub fn mark_pure_call(&mut self, index: u32) {
        self.pure_calls.insert(index);
    }

    /// Gets the call sites proven side-effect free.
    #[must_use]
    pub fn pure_calls(&self) -> &BTreeSet<u32> {
        &self.pure_calls
    }

    /// Records that a dereference at `index` was performed, and whether the
    /// dereferenced operand was provably non-null in the dispatching state.
    pub fn mark_dereference(&mut self, index: u32, safe: bool) {
        self.dereferences
            .entry(index)
            .and_modify(|all_safe| *all_safe &= safe)
            .or_insert(safe);
    }

    /// Gets the dereference sites where every reaching state carried a
    /// provably non-null operand.
    #[must_use]
    pub fn proven_safe_dereferences(&self) -> Vec<u32> {
        self.dereferences
            .iter()
            .filter(|(_, safe)| **safe)
            .map(|(index, _)| *index)
            .collect()
    }

    /// Archives a state that reached a normal method exit.
    pub fn archive_exit(&mut self, state: MemoryState) {
        self.exit_states.push(state);
    }

    /// Archives a state that left the method on an unhandled exceptional
    /// edge.
    pub fn archive_exceptional_exit(&mut self, state: MemoryState) {
        self.exceptional_exits.push(state);
    }

    /// Gets the states archived at normal method exits.
    #[must_use]
    pub fn exit_states(&self) -> &[MemoryState] {
        self.exit_states.as_slice()
    }

    /// Gets the states archived at unhandled exceptional exits.
    #[must_use]
    pub fn exceptional_exits(&self) -> &[MemoryState] {
        self.exceptional_exits.as_slice()
    }

    /// Produces the serialisable summary of this report.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        let mut always_true = Vec::new();
        let mut always_false = Vec::new();
        for index in self.branches.keys() {
            if self.branch_always_true(*index) {
                always_true.push(*index);
            }
            if self.branch_always_false(*index) {
                always_false.push(*index);
            }
        }
        always_true.sort_unstable();
        always_false.sort_unstable();

        ReportSummary {
            always_true_branches: always_true,
            always_false_branches: always_false,
            violations: self
                .violations()
                .iter()
                .map(|v| ViolationSummary {
                    location: v.location,
                    message: v.payload.to_string(),
                })
                .collect(),
            pure_calls: self.pure_calls.iter().copied().collect(),
            safe_dereferences: self.proven_safe_dereferences(),
        }
    }
}

/// The consumer-facing projection of a [`Report`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Branches that were reached and only ever took their true edge.
    pub always_true_branches: Vec<u32>,

    /// Branches that were reached and only ever took their false edge.
    pub always_false_branches: Vec<u32>,

    /// The discovered contract violations.
    pub violations: Vec<ViolationSummary>,

    /// Call sites proven side-effect free.
    pub pure_calls: Vec<u32>,

    /// Dereference sites proven safe in every reaching state.
    pub safe_dereferences: Vec<u32>,
}

/// One rendered violation within a [`ReportSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    /// The instruction index at which the violation was discovered.
    pub location: u32,

    /// The rendered description of the violation.
    pub message: String,
}

#[cfg(test)]
mod test {
    use crate::report::{Report, Violation};

    #[test]
    fn branch_flags_are_sticky() {
        let mut report = Report::new();
        report.mark_branch(3, true);
        assert!(report.branch_always_true(3));

        report.mark_branch(3, false);
        assert!(!report.branch_always_true(3));
        assert!(!report.branch_always_false(3));
    }

    #[test]
    fn unreached_branches_are_not_always_anything() {
        let report = Report::new();
        assert!(!report.branch_always_true(0));
        assert!(!report.branch_always_false(0));
    }

    #[test]
    fn dereference_safety_requires_every_state_to_agree() {
        let mut report = Report::new();
        report.mark_dereference(5, true);
        assert_eq!(report.proven_safe_dereferences(), vec![5]);

        report.mark_dereference(5, false);
        assert!(report.proven_safe_dereferences().is_empty());
    }

    #[test]
    fn violations_are_sorted_by_location() {
        let mut report = Report::new();
        report.report_violation(9, Violation::PossiblyNullDereference { certain: false });
        report.report_violation(2, Violation::PossiblyNegativeArraySize { certain: true });

        let locations: Vec<u32> = report.violations().iter().map(|v| v.location).collect();
        assert_eq!(locations, vec![2, 9]);
    }

    #[test]
    fn summary_round_trips_through_json() -> anyhow::Result<()> {
        let mut report = Report::new();
        report.mark_branch(1, true);
        report.mark_pure_call(4);
        report.report_violation(7, Violation::PossiblyNullDereference { certain: true });

        let summary = report.summary();
        let encoded = serde_json::to_string(&summary)?;
        let decoded: crate::report::ReportSummary = serde_json::from_str(&encoded)?;
        assert_eq!(summary, decoded);

        Ok(())
    }
}
