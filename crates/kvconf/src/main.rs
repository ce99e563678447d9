//! kvconf CLI Application
//!
//! Builds a layered configuration (JSON files, environment variables,
//! command-line values), adds the secrets of an Azure Key Vault as the
//! highest-priority layer, and either prints the result or runs a command
//! with it projected into the environment.

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod commands;
mod errors;
mod tracing;

use crate::cli::Cli;
use crate::errors::{EXIT_RUNTIME, exit_code_for, render_error};
use crate::tracing::TracingConfig;
use clap::Parser;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = Cli::parse();
    let exit_code = run_with_tokio(cli);
    std::process::exit(exit_code);
}

fn run_with_tokio(cli: Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return EXIT_RUNTIME;
        }
    };

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> i32 {
    let tracing_config = TracingConfig {
        format: cli.format,
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = crate::tracing::init_tracing(tracing_config) {
        eprintln!("{e:?}");
        return EXIT_RUNTIME;
    }

    match commands::run(cli.command, &cli.config).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            ::tracing::debug!(exit_code = code, "Command failed");
            render_error(err);
            code
        }
    }
}
