//! CLI tool for inspecting and verifying persisted version history.
//!
//! Opens a data directory written by `VersioningEngine::flush` using the
//! record types recorded alongside it, and answers history queries.

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use revision_core::persistence::HistoryPersistence;
use revision_core::{
    ChangeSet, FieldValue, KeyValue, RecordId, RecordKey, TransactionId, VersioningConfig, VersioningEngine,
};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let engine = open_engine(&cli)?;

    match cli.command {
        Commands::Transactions { ref actor } => {
            let rows = match actor {
                Some(actor) => engine.transactions_by_actor(actor),
                None => engine.transactions(),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            for row in rows {
                let types = engine.changed_types(row.id)?;
                println!(
                    "{}\t{}\t{}\t{}",
                    row.id,
                    row.issued_at.to_rfc3339(),
                    row.actor.as_deref().unwrap_or("-"),
                    types.join(",")
                );
            }
        }
        Commands::Versions {
            ref record_type,
            ref key,
        } => {
            let record = record_id(record_type, key);
            let versions = engine.list_versions(&record)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
                return Ok(());
            }
            for version in versions {
                println!(
                    "v{}\t{}\t{}\t{} field(s)",
                    version.version_number,
                    version.transaction_id,
                    version.operation,
                    version.snapshot.len()
                );
            }
        }
        Commands::Changes { transaction_id } => {
            let changes = engine.changes_in(TransactionId(transaction_id))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
                return Ok(());
            }
            for change in &changes {
                print_changes(change);
            }
        }
        Commands::Diff {
            ref record_type,
            ref key,
            from,
            to,
        } => {
            let record = record_id(record_type, key);
            let changes = engine.diff_versions(&record, from, to)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
                return Ok(());
            }
            print_changes(&changes);
        }
        Commands::Verify => {
            let history = engine.history();
            println!(
                "OK: {} record type(s), {} transaction(s), {} version(s)",
                engine.registry().len(),
                history.transaction_count(),
                history.version_count()
            );
        }
    }

    Ok(())
}

/// Opens the history with the record types saved next to it.
fn open_engine(cli: &Cli) -> Result<VersioningEngine> {
    let config = VersioningConfig {
        data_dir: Some(cli.data_dir.clone()),
        ..Default::default()
    };
    let persistence = HistoryPersistence::new(cli.data_dir.clone(), &config);
    let Some(registry) = persistence
        .load_registry()
        .context("Failed to read history schema")?
    else {
        bail!("No history found in {}", cli.data_dir.display());
    };

    tracing::debug!("Opening history in {}", cli.data_dir.display());
    VersioningEngine::open(config, Arc::new(registry)).context("Failed to load history")
}

/// Parses a command-line key: integers stay integers, anything else is text.
fn record_id(record_type: &str, key: &str) -> RecordId {
    let parts = key
        .split(',')
        .map(str::trim)
        .map(|part| match part.parse::<i64>() {
            Ok(value) => KeyValue::Int(value),
            Err(_) => KeyValue::Text(part.to_string()),
        })
        .collect();
    RecordId::new(record_type, RecordKey(parts))
}

fn print_changes(changes: &ChangeSet) {
    if let Some(ref record) = changes.record {
        match changes.operation {
            Some(operation) => println!("{} ({})", record, operation),
            None => println!("{}", record),
        }
    }
    for (field, change) in &changes.changed_fields {
        println!("  {}: {} -> {}", field, show(&change.old), show(&change.new));
    }
}

fn show(value: &Option<FieldValue>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "<absent>".to_string(),
    }
}
