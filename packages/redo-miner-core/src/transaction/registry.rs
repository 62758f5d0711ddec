use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::MinerConfig;
use crate::decode::{DmlChange, UndoChange};
use crate::error::MinerError;
use crate::opcode;
use crate::record::layout::{BeginTxn, CommitTxn};
use crate::record::{ChangeHeader, RecordBuf};
use crate::types::{Scn, TimePoint, Xid};

use super::row_change::RowChange;
use super::schema::{find_pk, SchemaLookup};
use super::transaction::{CommitState, Transaction};

/// Pending transactions that began at one SCN.
#[derive(Debug, Clone, Copy)]
struct PendingStart {
    count: u32,
    epoch: u32,
}

#[derive(Debug, Default)]
struct RegistryState {
    open: HashMap<Xid, Transaction>,
    committed: BTreeMap<Scn, Transaction>,
    start_scn_q: BTreeMap<Scn, PendingStart>,
    dba_map: HashMap<u32, u16>,
}

/// Registry mutation derived from one change vector.
enum Action {
    Begin { xid: Xid, dba: u32 },
    Row { xid: Xid, change: RowChange },
    Commit { xid: Xid, state: CommitState },
}

/// Checkpoint watermarks as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_commit: TimePoint,
    pub restart: TimePoint,
    pub open_transactions: usize,
    pub committed_transactions: usize,
}

impl Checkpoint {
    pub fn to_json(&self) -> Result<String, MinerError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What was left when the registry shut down.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Committed transactions in commit order
    pub committed: Vec<Transaction>,
    /// Transactions still open at shutdown
    pub still_open: usize,
}

/// Open and committed transactions plus the commit and restart watermarks.
///
/// Transaction state sits behind one lock and each watermark behind its own,
/// so watermark readers never wait on record ingestion. When both are held,
/// the state lock is taken first.
#[derive(Debug)]
pub struct TransactionRegistry {
    config: MinerConfig,
    state: Mutex<RegistryState>,
    last_commit: Mutex<TimePoint>,
    restart: Mutex<TimePoint>,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new(MinerConfig::default())
    }
}

impl TransactionRegistry {
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
            last_commit: Mutex::new(TimePoint::default()),
            restart: Mutex::new(TimePoint::default()),
        }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Decodes every change of `record` and applies the result.
    ///
    /// Decoding finishes before any state is touched, so a record that fails
    /// to decode leaves the registry unchanged.
    ///
    /// # Arguments
    /// * `record` - Log record to ingest
    /// * `schema` - Table definitions used to extract primary keys
    ///
    /// # Returns
    /// `Result<usize, MinerError>` with the number of registry mutations applied.
    pub fn add_to_transaction(
        &self,
        record: &RecordBuf,
        schema: &dyn SchemaLookup,
    ) -> Result<usize, MinerError> {
        let actions = self.decode_record(record, schema)?;
        let applied = actions.len();

        let mut state = self.state.lock();
        for action in actions {
            match action {
                Action::Begin { xid, dba } => self.apply_begin(&mut state, record, xid, dba),
                Action::Row { xid, change } => {
                    state
                        .open
                        .entry(xid)
                        .or_insert_with(|| Transaction::new(xid))
                        .merge(change);
                }
                Action::Commit {
                    xid,
                    state: outcome,
                } => self.apply_commit(&mut state, record, xid, outcome),
            }
        }
        Ok(applied)
    }

    fn decode_record(
        &self,
        record: &RecordBuf,
        schema: &dyn SchemaLookup,
    ) -> Result<Vec<Action>, MinerError> {
        let mut actions = Vec::new();
        let changes = &record.changes;
        let mut i = 0;
        // each row change of the record takes its own sub-position
        let mut row_sub = record.scn.sub;

        while i < changes.len() {
            let change = &changes[i];
            let op = change.op_code();
            i += 1;

            if !opcode::is_valid_opcode(op) {
                trace!("Skipping unknown opcode {:#06x} at scn {}", op, record.scn);
                continue;
            }

            match op {
                opcode::BEGIN_TRANS => {
                    let begin = BeginTxn::read(change.part(1)?)?;
                    actions.push(Action::Begin {
                        xid: begin.xid,
                        dba: change.dba(),
                    });
                }
                opcode::COMMIT => {
                    let commit = CommitTxn::read(change.part(1)?)?;
                    let state =
                        CommitState::from_flag(commit.flag, self.config.strict_commit_flags)?;
                    actions.push(Action::Commit {
                        xid: commit.xid,
                        state,
                    });
                }
                opcode::UNDO => {
                    let paired = changes.get(i).filter(|next| {
                        next.layer() == opcode::LAYER_ROW
                            && opcode::is_valid_opcode(next.op_code())
                    });
                    match paired {
                        Some(redo) => {
                            let scn = Scn::with_sub(record.scn.value, row_sub);
                            let (xid, row) =
                                build_row_change(record, scn, change, redo, schema)?;
                            actions.push(Action::Row { xid, change: row });
                            row_sub += 1;
                            i += 1;
                        }
                        None => trace!("Skipping unpaired undo at scn {}", record.scn),
                    }
                }
                _ => trace!(
                    "Skipping {} change at scn {}",
                    opcode::opcode_name(op).unwrap_or("other"),
                    record.scn
                ),
            }
        }

        debug!(
            "Decoded {} actions from record at scn {}",
            actions.len(),
            record.scn
        );
        Ok(actions)
    }

    fn apply_begin(&self, state: &mut RegistryState, record: &RecordBuf, xid: Xid, dba: u32) {
        state.dba_map.insert(dba, xid.usn());

        let txn = state
            .open
            .entry(xid)
            .or_insert_with(|| Transaction::new(xid));
        if !txn.start_scn.empty() {
            return;
        }
        txn.start_scn = record.scn;
        txn.start_epoch = record.epoch;

        state
            .start_scn_q
            .entry(record.scn)
            .and_modify(|pending| pending.count += 1)
            .or_insert(PendingStart {
                count: 1,
                epoch: record.epoch,
            });
        if state.start_scn_q.keys().next() == Some(&record.scn) {
            self.set_restart_time_point(TimePoint::new(record.scn, record.epoch));
        }
        trace!("Transaction {} began at scn {}", xid, record.scn);
    }

    fn apply_commit(
        &self,
        state: &mut RegistryState,
        record: &RecordBuf,
        xid: Xid,
        outcome: CommitState,
    ) {
        self.raise_last_commit(TimePoint::new(record.scn, record.epoch));

        let Some(mut txn) = state.open.remove(&xid) else {
            debug!("Commit for unknown transaction {} at scn {}", xid, record.scn);
            return;
        };
        self.retire_start_scn(state, txn.start_scn);

        if matches!(outcome, CommitState::RolledBack { .. }) {
            debug!(
                "Transaction {} rolled back at scn {}, discarding {} changes",
                xid,
                record.scn,
                txn.change_count()
            );
            return;
        }

        txn.set_commit(outcome, record.scn, record.epoch);
        if self.config.tidy_on_commit {
            txn.tidy_changes();
        }
        if txn.is_empty() && !self.config.keep_empty_transactions {
            debug!("Dropping empty transaction {} at scn {}", xid, record.scn);
            return;
        }

        let mut key = record.scn;
        while state.committed.contains_key(&key) {
            key.sub += 1;
        }
        debug!(
            "Transaction {} committed at scn {} with {} changes",
            xid,
            key,
            txn.change_count()
        );
        state.committed.insert(key, txn);
    }

    fn retire_start_scn(&self, state: &mut RegistryState, start_scn: Scn) {
        if start_scn.empty() {
            return;
        }
        if let Some(pending) = state.start_scn_q.get_mut(&start_scn) {
            pending.count -= 1;
            if pending.count == 0 {
                state.start_scn_q.remove(&start_scn);
            }
        } else {
            warn!("Start scn {} missing from the pending queue", start_scn);
        }

        let mut restart = self.restart.lock();
        if restart.scn == start_scn {
            *restart = state
                .start_scn_q
                .iter()
                .next()
                .map(|(scn, pending)| TimePoint::new(*scn, pending.epoch))
                .unwrap_or_default();
            trace!("Restart point now {}", *restart);
        }
    }

    fn raise_last_commit(&self, point: TimePoint) {
        let mut last = self.last_commit.lock();
        if point.scn > last.scn {
            *last = point;
        }
    }

    /// Drops open transactions whose begin record was never seen.
    ///
    /// # Returns
    /// Number of transactions removed.
    pub fn remove_uncompleted_trans(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.open.len();
        state.open.retain(|_, txn| !txn.start_scn.empty());
        let removed = before - state.open.len();
        if removed > 0 {
            info!("Removed {} transactions without a start scn", removed);
        }
        removed
    }

    pub fn last_commit_time_point(&self) -> TimePoint {
        *self.last_commit.lock()
    }

    pub fn restart_time_point(&self) -> TimePoint {
        *self.restart.lock()
    }

    /// Overwrites the last-commit watermark.
    pub fn set_last_commit_time_point(&self, point: TimePoint) {
        *self.last_commit.lock() = point;
    }

    /// Overwrites the restart watermark.
    pub fn set_restart_time_point(&self, point: TimePoint) {
        *self.restart.lock() = point;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.state.lock();
        Checkpoint {
            last_commit: self.last_commit_time_point(),
            restart: self.restart_time_point(),
            open_transactions: state.open.len(),
            committed_transactions: state.committed.len(),
        }
    }

    /// Removes and returns committed transactions in commit order.
    pub fn drain_committed(&self) -> Vec<Transaction> {
        let mut state = self.state.lock();
        std::mem::take(&mut state.committed).into_values().collect()
    }

    /// Runs a closure over the committed transactions keyed by commit SCN.
    pub fn with_committed<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BTreeMap<Scn, Transaction>) -> R,
    {
        let state = self.state.lock();
        f(&state.committed)
    }

    /// Snapshot of an open transaction.
    pub fn open_transaction(&self, xid: Xid) -> Option<Transaction> {
        self.state.lock().open.get(&xid).cloned()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn committed_count(&self) -> usize {
        self.state.lock().committed.len()
    }

    /// Number of open transactions with a known start SCN.
    pub fn pending_start_count(&self) -> usize {
        self.state
            .lock()
            .start_scn_q
            .values()
            .map(|pending| pending.count as usize)
            .sum()
    }

    /// Undo segment last seen beginning a transaction in block `dba`.
    pub fn usn_for_dba(&self, dba: u32) -> Option<u16> {
        self.state.lock().dba_map.get(&dba).copied()
    }

    /// Drains committed transactions and clears all remaining state.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut state = self.state.lock();
        let still_open = state.open.len();
        if still_open > 0 {
            warn!("Shutting down with {} open transactions", still_open);
        }
        let committed = std::mem::take(&mut state.committed).into_values().collect();
        *state = RegistryState::default();
        *self.restart.lock() = TimePoint::default();
        ShutdownReport {
            committed,
            still_open,
        }
    }
}

/// Pairs an undo change with the row change that follows it.
fn build_row_change(
    record: &RecordBuf,
    scn: Scn,
    undo: &ChangeHeader,
    redo: &ChangeHeader,
    schema: &dyn SchemaLookup,
) -> Result<(Xid, RowChange), MinerError> {
    let undo = UndoChange::new(undo)?;
    let header = undo.header()?;
    let object_id = undo.object_id()?;
    let undo_row = undo.make_up_undo()?.into_iter().next().unwrap_or_default();

    let dml = DmlChange::new(redo)?;
    let iflag = dml.row_flag()?;
    let redo_row = dml
        .make_up_redo_cols()?
        .into_iter()
        .next()
        .unwrap_or_default();

    let tab = schema.table_def(object_id);
    let (_, old_pk) = find_pk(tab.as_deref(), &undo_row);
    let (_, new_pk) = find_pk(tab.as_deref(), &redo_row);

    let mut change = RowChange::new(scn, object_id, dml.op_code(), undo_row, redo_row);
    change.epoch = record.epoch;
    change.uflag = header.flag;
    change.iflag = iflag;
    change.old_pk = old_pk;
    change.new_pk = new_pk;

    debug!(
        "Row change {} on object {} at scn {}: {} undo / {} redo columns",
        opcode::opcode_name(change.op).unwrap_or("other"),
        object_id,
        scn,
        change.undo.len(),
        change.redo.len()
    );
    Ok((header.xid, change))
}
