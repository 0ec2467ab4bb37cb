mod capture;
mod cli;
mod config;
mod error;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    capture::{CaptureOptions, run_capture},
    cli::{Args, Commands},
    config::AppConfig,
    error::{AppError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Capture {
            url,
            last,
            start,
            end,
            live_edge,
            warmup,
            output,
            dump_state,
        } => {
            if !warmup.is_finite() || warmup < 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "warmup must be a non-negative number of seconds, got {warmup}"
                )));
            }

            let output_dir = output
                .or_else(|| config.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let engine = config.to_engine_config()?;

            let saved = run_capture(
                engine,
                CaptureOptions {
                    url,
                    last,
                    start,
                    end,
                    live_edge,
                    warmup: Duration::from_secs_f64(warmup),
                    output_dir,
                    dump_state,
                },
            )
            .await?;

            info!(size = saved.size, "Saved {}", saved.filename);
            println!("{}", saved.location);
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| AppError::InvalidConfig(e.to_string()))?;
            print!("{rendered}");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
