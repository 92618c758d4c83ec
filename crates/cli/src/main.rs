mod args;
mod output;
mod run_info;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};
use runner::{run_audit, run_worker_process};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_logging(cli.verbose, "info");
            let status = run_audit(args).await?;
            if status != 0 {
                std::process::exit(status);
            }
        }
        Commands::Worker => {
            // stdout carries protocol lines only.
            init_logging(cli.verbose, "warn");
            run_worker_process().await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet_level: &str) {
    let log_level = match verbose {
        0 => quiet_level,
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
