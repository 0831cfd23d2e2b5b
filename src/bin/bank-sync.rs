//! One-shot command line entry point, meant to be called by cron or a timer.

use std::error::Error;
use std::process::ExitCode;

use bank_sync_core::clients::{N26Client, YnabClient};
use bank_sync_core::config::{CliArgs, Command, Config};
use bank_sync_core::utils::{DirObjectStore, JsonBindingStore};
use bank_sync_core::{jobs, BackupExporter, ReconciliationEngine, SyncError, SyncResult};
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  Caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command, config: &Config) -> SyncResult<()> {
    match command {
        Command::Update => {
            config.validate_remote()?;
            // Lease first: the table must not be loaded while another process writes it
            let bindings = JsonBindingStore::open_exclusive(&config.storage.bindings_path)?;

            let engine = ReconciliationEngine::new(source(config)?, destination(config)?, bindings);
            let info_store = DirObjectStore::open(&config.storage.info_dir)?;
            let report = jobs::update(&engine, &info_store).await?;

            for rejection in &report.rejected {
                eprintln!("rejected {}: {}", rejection.source_id, rejection.reason);
            }
            if !report.unrecorded.is_empty() {
                eprintln!(
                    "{} transaction(s) mirrored without a recorded binding",
                    report.unrecorded.len()
                );
            }
            info!(
                created = report.created.len(),
                skipped = report.skipped,
                "updated budget"
            );
            println!("{}", report.balance.amount);
        }
        Command::Backup => {
            if config.source.access_token.trim().is_empty() {
                return Err(SyncError::Config("missing settings: source.access_token".to_string()));
            }
            let exporter = BackupExporter::new(source(config)?);
            let backups = DirObjectStore::open(&config.storage.backups_dir)?;
            let name = jobs::backup(&exporter, &backups).await?;
            println!("{}", backups.root().join(name).display());
        }
        Command::Balance => {
            let info_store = DirObjectStore::open(&config.storage.info_dir)?;
            match jobs::read_balance(&info_store).await? {
                Some(balance) => println!("{balance}"),
                None => {
                    return Err(SyncError::ObjectStore(
                        "no balance has been published yet".to_string(),
                    ))
                }
            }
        }
    }
    Ok(())
}

fn source(config: &Config) -> SyncResult<N26Client> {
    N26Client::new(
        &config.source.base_url,
        &config.source.access_token,
        config.source.limit,
        config.timeout(),
    )
}

fn destination(config: &Config) -> SyncResult<YnabClient> {
    YnabClient::new(
        &config.destination.base_url,
        &config.destination.access_token,
        &config.destination.budget_id,
        &config.destination.account_id,
        config.timeout(),
    )
}
