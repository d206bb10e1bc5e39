//! Gym enricher CLI
//!
//! Local execution entry point for batch enrichment runs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use enricher::{
    config::{load_config, load_stubs, write_json},
    error::Result,
    models::Config,
    pipeline,
};
use tokio_util::sync::CancellationToken;

/// Enrich gym records from several web sources
#[derive(Parser, Debug)]
#[command(
    name = "enricher",
    version,
    about = "Multi-source gym enrichment pipeline"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich every gym in the input file
    Enrich {
        /// JSON array of gym stubs
        #[arg(short, long, default_value = "data/gyms.json")]
        input: PathBuf,

        /// Where to write the merged profiles (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the per-source health snapshot
        #[arg(long)]
        health: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,

    /// List enabled sources in query order
    Sources,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C so in-flight gyms wind down.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, finishing in-flight requests...");
            token.cancel();
        }
    });
}

fn print_sources(config: &Config) {
    for source in config.enabled_sources() {
        let key = match &source.api_key_env {
            Some(var) if std::env::var(var).is_err() => format!(" (missing {var})"),
            _ => String::new(),
        };
        log::info!(
            "{:>3}  {:<14} {:<10} confidence {:.2}{}",
            source.priority,
            source.id,
            format!("{:?}", source.kind),
            source.confidence,
            key
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Enrich {
            input,
            output,
            health,
        } => {
            let config = load_config(&cli.config)?;
            log::info!("Loaded configuration from {}", cli.config.display());

            let stubs = load_stubs(&input)?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let report = pipeline::run_enrichment(&config, &stubs, cancel).await?;

            match output {
                Some(path) => {
                    write_json(&path, &report.profiles).await?;
                    log::info!("Profiles saved to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&report.profiles)?),
            }

            if let Some(path) = health {
                write_json(&path, &report.health).await?;
                log::info!("Health snapshot saved to {}", path.display());
            }

            for source in &report.health {
                log::info!(
                    "{:<14} {:?}  success {:.0}%  attempts {}  avg delay {:.0}ms",
                    source.source,
                    source.state,
                    source.success_rate * 100.0,
                    source.total_attempts,
                    source.average_delay_ms
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            let config = match load_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Config validation failed: {}", e);
                    return Err(e);
                }
            };
            log::info!(
                "✓ Config OK ({} sources, {} enabled)",
                config.sources.len(),
                config.enabled_sources().len()
            );
        }

        Command::Sources => {
            let config = load_config(&cli.config)?;
            print_sources(&config);
        }
    }

    Ok(())
}
