//! Integration tests for the repodata patch overlay

mod cli_contracts;
mod overlay_scenarios;
mod patch_stream;
mod properties;
