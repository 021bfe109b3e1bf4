//! aftercommit - savepoint hook simulator
//!
//! This is the main entry point for the aftercommit command-line interface.

use std::process::ExitCode;

use aftercommit::db::{Repl, ReplConfig};
use aftercommit::savepoint::InterceptorConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Drive savepoint releases and rollbacks through the hook interceptor.
#[derive(Debug, Parser)]
#[command(name = "aftercommit", version, about)]
struct Cli {
    /// Execute `;`-separated statements and exit
    #[arg(short, long, value_name = "SCRIPT")]
    execute: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Keep rollbacks live after a release in the same scope
    #[arg(long)]
    no_suppress: bool,

    /// Keep hooks registered after a boundary resolves
    #[arg(long)]
    keep_hooks: bool,

    /// Show timing for each statement
    #[arg(long)]
    timing: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let interceptor = InterceptorConfig::new()
        .suppress_rollback_after_release(!cli.no_suppress)
        .clear_hooks_on_cleanup(!cli.keep_hooks)
        .label("repl");
    let config = ReplConfig {
        timing: cli.timing,
        ..Default::default()
    };
    let mut repl = Repl::with_config(config, interceptor);

    let result = match cli.execute {
        Some(script) => repl.run_script(&script),
        None => repl.run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "aftercommit=debug" } else { "aftercommit=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
