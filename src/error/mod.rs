//! This module contains the library's error types, organised by concern:
//! [`program`] for errors while constructing an instruction program,
//! [`analysis`] for errors while interpreting one, and [`container`] for the
//! location-carrying wrappers shared between them.
//!
//! Each public entry point returns its own concern's error type directly:
//! [`ProgramBuilder::finish`](crate::program::ProgramBuilder::finish) returns
//! [`program::Error`]s and [`Engine::run`](crate::engine::Engine::run)
//! returns [`analysis::Error`]s, both located at an instruction index.

pub mod analysis;
pub mod container;
pub mod program;
