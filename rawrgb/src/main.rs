//! # rawrgb
//!
//! Command line entry point. Parameters come from an optional JSON config
//! file overridden by flags; logs go to stderr.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use rawrgb::cli::Cli;
use rawrgb::error::EXIT_CONFIG;
use rawrgb::{pipeline, PipelineConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("rawrgb v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::debug!(?config, "effective configuration");

    match pipeline::execute(&config) {
        Ok(report) => {
            tracing::info!(output = %report.output_path.display(), "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = if let Some(path) = &cli.config {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        PipelineConfig::from_json(&data).with_context(|| format!("parsing config {}", path.display()))?
    } else {
        PipelineConfig::default()
    };
    cli.apply(&mut config);
    Ok(config)
}
