//! repodata-overlay CLI Binary
//!
//! Command-line interface for the repodata patch overlay.

use anyhow::Context;
use clap::Parser;
use repodata_overlay::config::ConfigLoader;
use repodata_overlay::logging::init_logging;
use repodata_overlay::tooling::cli::{Cli, CliContext};
use std::process;

fn run(cli: &Cli) -> anyhow::Result<String> {
    let mut config = ConfigLoader::load_optional(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply_log_overrides(&mut config);
    init_logging(Some(&config.logging)).context("Failed to initialize logging")?;

    let context = CliContext::new(&config, cli.cache_dir.clone(), &cli.name)
        .with_context(|| format!("Failed to open cache {}", cli.name))?;
    Ok(context.execute(&cli.command)?)
}

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
