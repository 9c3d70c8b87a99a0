//! Utilities for use in integration tests.
#![allow(dead_code)]

use dataflow_analyzer::{
    engine::{AnalysisResult, Config, Engine},
    program::Program,
    watchdog::LazyWatchdog,
};

/// Runs `program` to its fixpoint under the default configuration.
pub fn run(program: Program) -> anyhow::Result<AnalysisResult> {
    Ok(Engine::new(program, LazyWatchdog.in_rc()).run()?)
}

/// Runs `program` to its fixpoint under the provided `config`.
pub fn run_with_config(program: Program, config: Config) -> anyhow::Result<AnalysisResult> {
    Ok(Engine::new(program, LazyWatchdog.in_rc())
        .with_config(config)
        .run()?)
}
