//! FloatSmith CLI: guided mixed-precision tuning of C/C++ programs.
//!
//! Generates the acquire/build/run/verify scripts for a project, discovers
//! tunable floating-point variables, and drives the precision search. Also
//! ships the report utilities that read action configurations.

mod commands;
mod prompt;
mod reports;

use clap::Parser;
use color_eyre::eyre::Result;
use floatsmith_shared::FloatSmithError;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    match commands::run(cli).await {
        Ok(()) => Ok(()),
        Err(report) => match report.downcast_ref::<FloatSmithError>() {
            Some(e) => {
                eprintln!("Error: {e}");
                std::process::exit(e.exit_code());
            }
            None => Err(report),
        },
    }
}
