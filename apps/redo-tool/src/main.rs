//! CLI for replaying redo change fixtures.
//!
//! Provides commands for:
//! - Replaying a fixture through a mining session
//! - Writing a sample fixture
//! - Listing recognised opcodes

mod fixture;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use redo_miner_core::opcode;
use redo_miner_core::session::FATAL_EXIT_CODE;
use redo_miner_core::{MinerConfig, MiningSession, Row, SchemaCache, Transaction};

use crate::fixture::Fixture;

/// Command-line arguments for the redo tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log filter, overrides RUST_LOG (e.g. "debug", "redo_miner_core=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a fixture and print committed transactions and checkpoints
    Replay {
        /// Fixture file of hex-encoded records
        #[arg(short, long)]
        input: PathBuf,

        /// JSON array of table definitions
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Miner configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Drop transactions without a begin record before reporting
        #[arg(long)]
        gc: bool,
    },
    /// Print a sample fixture
    Sample,
    /// List recognised opcodes
    Opcodes,
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn row_json(row: &Row) -> serde_json::Value {
    row.iter()
        .map(|c| json!({ "column_id": c.column_id, "data": hex::encode(&c.data) }))
        .collect()
}

fn transaction_json(txn: &Transaction) -> serde_json::Value {
    let changes: Vec<_> = txn
        .changes()
        .map(|change| {
            json!({
                "scn": change.scn.to_string(),
                "object_id": change.object_id,
                "op": opcode::opcode_name(change.op).unwrap_or("other"),
                "complete": change.completed(),
                "undo": row_json(&change.undo),
                "redo": row_json(&change.redo),
                "old_pk": change.old_pk.keys().collect::<Vec<_>>(),
                "new_pk": change.new_pk.keys().collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "xid": txn.xid.to_string(),
        "start_scn": txn.start_scn.to_string(),
        "commit_scn": txn.commit_scn.to_string(),
        "start_epoch": txn.start_epoch,
        "end_epoch": txn.end_epoch,
        "changes": changes,
    })
}

fn replay(
    input: PathBuf,
    schema: Option<PathBuf>,
    config: Option<PathBuf>,
    gc: bool,
) -> Result<()> {
    let config = MinerConfig::load(config.as_deref()).context("failed to load configuration")?;
    let schema = match schema {
        Some(path) => SchemaCache::from_defs(fixture::load_schema(&path)?),
        None => SchemaCache::new(),
    };
    let records = Fixture::from_file(&input)?.to_records()?;
    info!("Replaying {} records from {}", records.len(), input.display());

    let mut session = MiningSession::new(config, Arc::new(schema));
    for record in &records {
        if let Err(e) = session.process(record) {
            error!("Stopping replay at scn {}: {}", record.scn, e);
            if e.is_fatal() {
                std::process::exit(FATAL_EXIT_CODE);
            }
            return Err(e.into());
        }
    }
    if gc {
        let removed = session.collect_garbage();
        info!("Collected {} transactions without a begin record", removed);
    }

    let checkpoint = session.registry().checkpoint();
    let stats = session.stats();
    let report = session.finish();
    for txn in &report.committed {
        println!("{}", transaction_json(txn));
    }
    println!(
        "{}",
        json!({
            "last_commit": checkpoint.last_commit,
            "restart": checkpoint.restart,
            "still_open": report.still_open,
            "stats": stats,
        })
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    match args.command {
        Command::Replay {
            input,
            schema,
            config,
            gc,
        } => replay(input, schema, config, gc),
        Command::Sample => {
            let sample = serde_json::to_string_pretty(&fixture::sample()?)?;
            println!("{}", sample);
            Ok(())
        }
        Command::Opcodes => {
            for (op, name) in opcode::VALID_OPCODES {
                println!("{:#06x}  {}", op, name);
            }
            Ok(())
        }
    }
}
