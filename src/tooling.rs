//! Tooling & Integration Layer
//!
//! Command-line access to a cache entry for scripts and manual inspection.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
