//! This module contains constants that are needed throughout the codebase.

/// The maximum depth of the operand stack in any memory state.
///
/// A well-formed instruction program produced by the control-flow builder
/// keeps the operand stack shallow; hitting this limit indicates a malformed
/// program rather than a deep-but-valid one.
pub const MAXIMUM_STACK_DEPTH: usize = 256;

/// The default global ceiling on worklist iterations for a single analysis
/// run.
///
/// When this many work items have been processed without reaching a fixpoint,
/// the analysis aborts with [`crate::engine::RunStatus::AbortedTooComplex`].
pub const DEFAULT_ITERATION_CEILING: usize = 30_000;

/// The default maximum number of times that the scheduler will process a work
/// item for any single instruction index.
///
/// This bounds exploration of cyclic control flow per instruction,
/// independently of the global iteration ceiling.
pub const DEFAULT_VISITS_PER_INSTRUCTION: usize = 64;

/// The default number of incomparable states retained at a single instruction
/// index before the scheduler forces a widening join-all.
///
/// This is the precision/performance trade-off knob for loop convergence: a
/// higher value keeps more distinct path states, a lower value converges
/// faster. It is deliberately configurable via
/// [`crate::engine::Config::with_merge_threshold`].
pub const DEFAULT_MERGE_THRESHOLD: usize = 4;

/// The default number of worklist iterations the engine will wait before
/// polling the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;
