//! Mining session: feeds records into a registry and decides what a
//! decode failure means for the process.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{FatalPolicy, MinerConfig};
use crate::error::MinerError;
use crate::record::RecordBuf;
use crate::transaction::{SchemaLookup, ShutdownReport, TransactionRegistry};

/// Exit status used when a fatal decode error aborts the process.
pub const FATAL_EXIT_CODE: i32 = 100;

/// Result of feeding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Record decoded; carries the number of registry mutations
    Applied(usize),
    /// Record failed to decode and was left out
    Skipped(MinerError),
}

/// Running counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub records: u64,
    pub applied: u64,
    pub skipped: u64,
    pub collected: u64,
}

/// Top-level driver owning the registry, the schema lookup and the config.
pub struct MiningSession {
    config: MinerConfig,
    registry: Arc<TransactionRegistry>,
    schema: Arc<dyn SchemaLookup>,
    stats: SessionStats,
}

impl MiningSession {
    pub fn new(config: MinerConfig, schema: Arc<dyn SchemaLookup>) -> Self {
        info!("Starting mining session with {:?}", config);
        Self {
            registry: Arc::new(TransactionRegistry::new(config.clone())),
            config,
            schema,
            stats: SessionStats::default(),
        }
    }

    /// Shared handle for watermark readers on other threads.
    pub fn registry(&self) -> Arc<TransactionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Feeds one record.
    ///
    /// Non-fatal decode errors are logged and reported as `Skipped`. Fatal
    /// ones either end the process or come back as `Err`, depending on
    /// the configured `FatalPolicy`.
    pub fn process(&mut self, record: &RecordBuf) -> Result<RecordOutcome, MinerError> {
        self.stats.records += 1;
        match self.registry.add_to_transaction(record, self.schema.as_ref()) {
            Ok(applied) => {
                if applied > 0 {
                    self.stats.applied += 1;
                }
                Ok(RecordOutcome::Applied(applied))
            }
            Err(e) if e.is_fatal() => match self.config.fatal_policy {
                FatalPolicy::Abort => {
                    error!("Fatal error at scn {}: {}", record.scn, e);
                    std::process::exit(FATAL_EXIT_CODE);
                }
                FatalPolicy::Propagate => {
                    error!("Fatal error at scn {}: {}", record.scn, e);
                    Err(e)
                }
            },
            Err(e) => {
                warn!("Skipping record at scn {}: {}", record.scn, e);
                self.stats.skipped += 1;
                Ok(RecordOutcome::Skipped(e))
            }
        }
    }

    /// Feeds records in order, stopping at the first propagated error.
    pub fn process_all<'a, I>(&mut self, records: I) -> Result<SessionStats, MinerError>
    where
        I: IntoIterator<Item = &'a RecordBuf>,
    {
        for record in records {
            self.process(record)?;
        }
        Ok(self.stats)
    }

    /// Drops transactions that never saw their begin record.
    pub fn collect_garbage(&mut self) -> usize {
        let removed = self.registry.remove_uncompleted_trans();
        self.stats.collected += removed as u64;
        removed
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Ends the session, returning committed transactions and the count of
    /// those still open.
    pub fn finish(self) -> ShutdownReport {
        let report = self.registry.shutdown();
        info!(
            "Session finished: {} records, {} applied, {} skipped, {} committed, {} still open",
            self.stats.records,
            self.stats.applied,
            self.stats.skipped,
            report.committed.len(),
            report.still_open
        );
        report
    }
}
