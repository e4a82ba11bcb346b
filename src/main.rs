use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tls_extract::config::{self, Overrides};
use tls_extract::observability;
use tls_extract::tls::{
    ChangeDetector, ExpiryClock, JsonConfigSource, PemFileWriter, RenewalCoordinator, SignalTrap,
};

#[derive(Parser)]
#[command(name = "tls-extract")]
#[command(about = "Republishes the TLS certificate and key embedded in a JSON config document", long_about = None)]
struct Cli {
    /// Optional TOML settings file
    #[arg(short, long, env = "TLS_EXTRACT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the JSON config document
    #[arg(long, env = "INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory receiving the certificate and key files
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Seconds between periodic checks (0 = only file changes and signals)
    #[arg(long, env = "CHECK_INTERVAL")]
    check_interval: Option<u64>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// text or json
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the config document and republish the certificate (default)
    Run,
    /// Extract the certificate once and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply(Overrides {
        input_dir: cli.input_dir,
        output_dir: cli.output_dir,
        check_interval_secs: cli.check_interval,
        log_level: cli.log_level,
        log_format: cli.log_format,
    });
    config::validate_config(&config)?;
    let _guard = observability::logging::init_logging(&config.logging);

    info!("Starting TLS certificate extractor...");
    config::check_directories(&config.paths)?;

    let config_path = config.paths.config_path();
    let source = Arc::new(JsonConfigSource::new(&config_path));
    let writer = Arc::new(PemFileWriter::in_dir(
        &config.paths.output_dir,
        &config.paths.cert_file,
        &config.paths.key_file,
    ));
    let coordinator = Arc::new(RenewalCoordinator::new(source, writer));

    if let Some(Commands::Once) = cli.command {
        coordinator
            .publish_once()
            .await
            .context("Failed to extract certificate")?;
        info!("Certificate extracted, exiting");
        return Ok(());
    }

    coordinator
        .initialize()
        .await
        .context("Cosmos config file not found or invalid")?;

    let watcher = ChangeDetector::new(
        coordinator.clone(),
        &config_path,
        config.renewal.debounce_millis,
    )
    .start()?;
    let clock = ExpiryClock::from_secs(coordinator.clone(), config.renewal.check_interval_secs)
        .spawn();

    SignalTrap::new(coordinator).run().await?;

    watcher.abort();
    if let Some(clock) = clock {
        clock.abort();
    }
    info!("Shutting down...");

    Ok(())
}
