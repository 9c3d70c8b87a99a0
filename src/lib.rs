//! A library for the abstract interpretation of linearized method bodies,
//! computing data-flow facts (nullability, constancy, numeric ranges, and
//! type constraints) without executing any real code.
//!
//! # How it Works
//!
//! A front end lowers a method body into a flat [`program::Program`]: a
//! closed instruction set over an operand stack, with resolved jump targets,
//! a variable table, and call-site descriptors. The [`engine::Engine`] then
//! drives a worklist to a fixpoint, interpreting each instruction against
//! symbolic [`value`]s with lattice-valued [`fact`]s attached:
//!
//! - Branches fork the memory state and narrow each side by the assumed
//!   condition; a side whose facts become contradictory is pruned as
//!   unreachable.
//! - Join points widen states back together with monotone lattice joins, so
//!   cyclic control flow converges.
//! - Along the way the engine records which branch edges were ever taken,
//!   which dereferences are provably safe, and where contracts (not-null
//!   arguments, non-negative array sizes) are violated, all in a
//!   [`report::Report`].
//!
//! The engine never resolves names, overloads, or generics; by the time a
//! program reaches it, binding has happened and only abstract semantics
//! remain.
//!
//! # Basic Usage
//!
//! ```
//! use dataflow_analyzer::{
//!     engine::{Engine, RunStatus},
//!     program::{Instruction, ProgramBuilder},
//!     value::ConstantValue,
//!     watchdog::LazyWatchdog,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = ProgramBuilder::new();
//! builder.emit(Instruction::PushConstant(ConstantValue::Int(1)));
//! builder.emit(Instruction::Return);
//! let program = builder.finish()?;
//!
//! let result = Engine::new(program, LazyWatchdog.in_rc()).run()?;
//! assert_eq!(result.status, RunStatus::Completed);
//! assert_eq!(result.report.exit_states().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Bounding a Run
//!
//! Analysis time is bounded in two independent ways: the
//! [`engine::Config`] ceilings abort runs that grow too complex, and a
//! [`watchdog::Watchdog`] lets the client cancel from outside (on a flag, a
//! deadline, or any custom policy). Both abort paths return a degraded
//! [`engine::RunStatus`] rather than an error, as an aborted run is less
//! precise but never wrong.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constant;
pub mod contract;
pub mod engine;
pub mod error;
pub mod fact;
pub mod interpreter;
pub mod program;
pub mod report;
pub mod state;
pub mod value;
pub mod watchdog;

pub use engine::{AnalysisResult, Config, Engine, RunStatus};
pub use program::{Program, ProgramBuilder};
pub use report::{Report, ReportSummary};
pub use watchdog::{DynWatchdog, LazyWatchdog, Watchdog};
