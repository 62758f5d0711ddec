use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::error::MinerError;
use crate::opcode;
use crate::types::{Scn, Xid};

use super::row_change::RowChange;

/// Commit flag bit marking a rollback.
pub const ROLLBACK_FLAG: u8 = 0x04;

/// Commit flags the log is known to produce.
pub const VALID_COMMIT_FLAGS: [u8; 6] = [0x00, 0x10, 0x02, 0x12, 0x04, 0x14];

/// Outcome of a transaction as far as the log has shown it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitState {
    #[default]
    Pending,
    Committed { flag: u8 },
    RolledBack { flag: u8 },
}

impl CommitState {
    /// Interprets a commit record's flag byte.
    ///
    /// With `strict` set, flags outside `VALID_COMMIT_FLAGS` are rejected.
    pub fn from_flag(flag: u8, strict: bool) -> Result<Self, MinerError> {
        if strict && !VALID_COMMIT_FLAGS.contains(&flag) {
            return Err(MinerError::malformed(
                "commit flag",
                format!("unrecognised commit flag {:#04x}", flag),
            ));
        }
        if flag & ROLLBACK_FLAG != 0 {
            Ok(CommitState::RolledBack { flag })
        } else {
            Ok(CommitState::Committed { flag })
        }
    }
}

/// Row changes of one transaction, ordered by SCN.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub xid: Xid,
    /// Empty until the begin record has been seen
    pub start_scn: Scn,
    pub commit_scn: Scn,
    pub start_epoch: u32,
    pub end_epoch: u32,
    pub state: CommitState,
    changes: BTreeMap<Scn, RowChange>,
}

impl Transaction {
    pub fn new(xid: Xid) -> Self {
        Self {
            xid,
            ..Default::default()
        }
    }

    /// Adds a row change.
    ///
    /// A fragment at the SCN of an incomplete change on the same object is
    /// combined into it, as is a continuation of an incomplete last change.
    /// Any other change at an occupied SCN moves to the next free `sub`.
    pub fn merge(&mut self, mut change: RowChange) {
        if let Some(existing) = self.changes.get_mut(&change.scn) {
            if existing.object_id == change.object_id && !existing.completed() {
                trace!("Combining fragment into change at scn {}", change.scn);
                existing.combine(change);
                return;
            }
        }
        if let Some(last) = self.changes.values_mut().next_back() {
            if !last.completed() && change.continues(last) {
                trace!(
                    "Combining continuation at scn {} into change at scn {}",
                    change.scn,
                    last.scn
                );
                last.combine(change);
                return;
            }
        }
        while self.changes.contains_key(&change.scn) {
            change.scn.sub += 1;
        }
        self.changes.insert(change.scn, change);
    }

    /// Coalesces leftover fragments and drops changes with no column data.
    ///
    /// An incomplete change absorbs the later changes that continue it until
    /// it completes or none are left. Other changes stay where they are.
    pub fn tidy_changes(&mut self) {
        let mut remaining: VecDeque<RowChange> =
            std::mem::take(&mut self.changes).into_values().collect();
        let mut tidied = BTreeMap::new();

        while let Some(mut change) = remaining.pop_front() {
            while !change.completed() {
                let Some(pos) = remaining
                    .iter()
                    .position(|next| next.continues(&change))
                else {
                    break;
                };
                if let Some(next) = remaining.remove(pos) {
                    change.combine(next);
                }
            }
            tidied.insert(change.scn, change);
        }

        tidied.retain(|_, change| {
            !(change.undo.is_empty()
                && change.redo.is_empty()
                && change.op != opcode::DELETE
                && change.op != opcode::MULTI_DELETE)
        });
        self.changes = tidied;
    }

    /// Records the commit outcome.
    pub fn set_commit(&mut self, state: CommitState, scn: Scn, epoch: u32) {
        self.state = state;
        self.commit_scn = scn;
        self.end_epoch = epoch;
    }

    /// Changes in SCN order.
    pub fn changes(&self) -> impl Iterator<Item = &RowChange> {
        self.changes.values()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Returns whether no row change has been recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Committed, and every change is whole.
    pub fn is_complete(&self) -> bool {
        self.has_committed() && self.changes.values().all(RowChange::completed)
    }

    pub fn still_pending(&self) -> bool {
        self.state == CommitState::Pending
    }

    pub fn has_rollback(&self) -> bool {
        matches!(self.state, CommitState::RolledBack { .. })
    }

    pub fn has_committed(&self) -> bool {
        matches!(self.state, CommitState::Committed { .. })
    }
}
