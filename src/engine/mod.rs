//! This module contains the fixpoint scheduler that drives abstract
//! interpretation of a [`Program`] to completion.
//!
//! The engine maintains a worklist of pending work items, each pairing a
//! [`MemoryState`] with the instruction index it must be dispatched at. One
//! item is processed per iteration; the successors the dispatcher produces go
//! back onto the worklist. Three mechanisms guarantee termination:
//!
//! - **Subsumption**: an incoming state at least as precise as one already
//!   explored at the same index is discarded without dispatch.
//! - **Widening**: once more than [`Config::merge_threshold`] incomparable
//!   states have accumulated at one index, the incoming state is joined with
//!   all of them, trading precision for convergence.
//! - **Ceilings**: a global iteration ceiling and a per-instruction visit
//!   limit abort pathological runs with [`RunStatus::AbortedTooComplex`]
//!   rather than looping forever.
//!
//! The engine also polls its [`Watchdog`](crate::watchdog::Watchdog) at a
//! coarse interval so a client can cancel a long run from outside.

pub mod visits;

use std::collections::VecDeque;

use crate::{
    constant::{
        DEFAULT_ITERATION_CEILING,
        DEFAULT_MERGE_THRESHOLD,
        DEFAULT_VISITS_PER_INSTRUCTION,
    },
    engine::visits::VisitCounts,
    error::{analysis::Result, container::Locatable},
    interpreter::Interpreter,
    program::Program,
    report::Report,
    state::MemoryState,
    value::{ValueArena, VariableId},
    watchdog::DynWatchdog,
};

/// How an analysis run ended.
///
/// An aborted run yields reduced precision (fewer or no facts), never a wrong
/// fact; the partially-filled report remains usable under that caveat.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunStatus {
    /// The fixpoint was reached and every reachable state was explored.
    Completed,

    /// The iteration ceiling or a per-instruction visit limit was hit.
    AbortedTooComplex,

    /// The watchdog requested a stop.
    AbortedTimedOut,
}

/// The tunable parameters of an analysis run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// The global ceiling on worklist iterations.
    pub iteration_ceiling: usize,

    /// The maximum number of work items processed at any single instruction
    /// index.
    pub visits_per_instruction: usize,

    /// The number of incomparable states retained at one index before an
    /// incoming state is widened by joining it with all of them.
    pub merge_threshold: usize,
}

impl Config {
    /// Constructs a config with the default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global iteration ceiling.
    #[must_use]
    pub fn with_iteration_ceiling(mut self, ceiling: usize) -> Self {
        self.iteration_ceiling = ceiling;
        self
    }

    /// Sets the per-instruction visit limit.
    #[must_use]
    pub fn with_visits_per_instruction(mut self, visits: usize) -> Self {
        self.visits_per_instruction = visits;
        self
    }

    /// Sets the widening threshold: the number of incomparable states kept at
    /// one index before joins are forced.
    #[must_use]
    pub fn with_merge_threshold(mut self, threshold: usize) -> Self {
        self.merge_threshold = threshold;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iteration_ceiling: DEFAULT_ITERATION_CEILING,
            visits_per_instruction: DEFAULT_VISITS_PER_INSTRUCTION,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
        }
    }
}

/// Everything an analysis run produced, handed to the consumer once the
/// engine is done with it.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    /// How the run ended.
    pub status: RunStatus,

    /// The reachability, violation, and exit-state data gathered during the
    /// run.
    pub report: Report,

    /// The value arena the run interned its values into; needed to resolve
    /// the handles held by archived states.
    pub arena: ValueArena,

    /// The number of worklist iterations the run took.
    pub iterations: usize,
}

/// The abstract interpretation engine for one program.
#[derive(Debug)]
pub struct Engine {
    /// The program being analysed.
    program: Program,

    /// The tunable parameters of the run.
    config: Config,

    /// The watchdog polled to check for external cancellation.
    watchdog: DynWatchdog,

    /// The arena owning every value interned during the run.
    arena: ValueArena,

    /// The side data accumulated during the run.
    report: Report,

    /// The number of worklist iterations processed so far.
    iterations: usize,
}

impl Engine {
    /// Constructs an engine over `program` with the default config.
    #[must_use]
    pub fn new(program: Program, watchdog: DynWatchdog) -> Self {
        Self {
            program,
            config: Config::default(),
            watchdog,
            arena: ValueArena::new(),
            report: Report::new(),
            iterations: 0,
        }
    }

    /// Replaces the engine's config.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Drives the analysis to its fixpoint (or an abort) and consumes the
    /// engine, returning everything the run produced.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] when the program violates the front-end contract
    /// during interpretation; see
    /// [`Interpreter::dispatch`](crate::interpreter::Interpreter::dispatch).
    pub fn run(mut self) -> Result<AnalysisResult> {
        let status = self.execute()?;
        Ok(AnalysisResult {
            status,
            report: self.report,
            arena: self.arena,
            iterations: self.iterations,
        })
    }

    /// The worklist loop.
    fn execute(&mut self) -> Result<RunStatus> {
        let entry = self.entry_state();
        let interpreter = Interpreter::new(&self.program);
        let types = self.program.types();
        let mut visits =
            VisitCounts::new(self.program.len(), self.config.visits_per_instruction);
        let mut explored: Vec<Vec<MemoryState>> = vec![Vec::new(); self.program.len()];
        let mut worklist: VecDeque<(u32, MemoryState)> = VecDeque::new();
        worklist.push_back((0, entry));

        let poll_every = self.watchdog.poll_every().max(1);

        while let Some((index, state)) = worklist.pop_front() {
            self.iterations += 1;
            if self.iterations % poll_every == 0 && self.watchdog.should_stop() {
                return Ok(RunStatus::AbortedTimedOut);
            }
            if self.iterations > self.config.iteration_ceiling || !visits.record(index) {
                return Ok(RunStatus::AbortedTooComplex);
            }

            let seen = match explored.get_mut(index as usize) {
                Some(seen) => seen,
                None => {
                    // Out of bounds; dispatch produces the located error.
                    interpreter.dispatch(index, state, &mut self.arena, &mut self.report)?;
                    continue;
                }
            };

            let mut redundant = false;
            for old in seen.iter() {
                if state.is_subsumed_by(old, &self.arena, types).locate(index)? {
                    redundant = true;
                    break;
                }
            }
            if redundant {
                continue;
            }

            // Past the threshold the incoming state is widened: joined with
            // every explored state in the same subroutine context, which are
            // all then covered by the single joined state.
            let state = if seen.len() >= self.config.merge_threshold {
                let mut widened = state;
                let mut unmergeable = Vec::new();
                for old in seen.drain(..) {
                    match widened.merge_with(&old, &mut self.arena, types).locate(index)? {
                        Some(combined) => widened = combined,
                        None => unmergeable.push(old),
                    }
                }
                *seen = unmergeable;
                widened
            } else {
                state
            };

            seen.push(state.clone());
            let successors =
                interpreter.dispatch(index, state, &mut self.arena, &mut self.report)?;
            worklist.extend(successors);
        }

        Ok(RunStatus::Completed)
    }

    /// Builds the state the run is seeded with: every variable slot carrying
    /// a declared fact has it bound before the first instruction executes.
    fn entry_state(&mut self) -> MemoryState {
        let mut entry = MemoryState::new();
        for (slot, info) in self.program.variables().iter().enumerate() {
            if let Some(fact) = &info.declared {
                let value = self.arena.variable(VariableId(
                    u32::try_from(slot).expect("Variable table length was validated"),
                ));
                entry.replace_fact(value, fact.clone());
            }
        }
        entry
    }
}
