use std::cmp::Ordering;

use crate::decode::DEFAULT_ROW_FLAG;
use crate::opcode;
use crate::types::{OrderedPk, Row, Scn};

/// Row piece flag bits (`iflag`).
pub mod row_flags {
    pub const HEAD: u8 = 0x20;
    pub const DELETED: u8 = 0x10;
    pub const FIRST: u8 = 0x08;
    pub const LAST: u8 = 0x04;
    pub const PREV_CONT: u8 = 0x02;
    pub const NEXT_CONT: u8 = 0x01;
}

/// Undo header flag bit: the before-image continues in a later record.
pub const UNDO_CONTINUED: u16 = 0x0010;

/// One row mutation within a transaction.
///
/// Ordered and compared by `scn` only.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub scn: Scn,
    pub epoch: u32,
    pub object_id: u32,
    /// Redo opcode (insert, update, delete, ...)
    pub op: u16,
    /// Lowest redo column id
    pub start_col: u16,
    /// Number of redo columns
    pub cc: u16,
    pub uflag: u16,
    pub iflag: u8,
    pub old_pk: OrderedPk,
    pub new_pk: OrderedPk,
    pub undo: Row,
    pub redo: Row,
}

impl RowChange {
    /// Creates a change with default flags and column bookkeeping taken
    /// from `redo`.
    pub fn new(scn: Scn, object_id: u32, op: u16, undo: Row, redo: Row) -> Self {
        let mut change = Self {
            scn,
            epoch: 0,
            object_id,
            op,
            start_col: 0,
            cc: 0,
            uflag: 0,
            iflag: DEFAULT_ROW_FLAG,
            old_pk: OrderedPk::new(),
            new_pk: OrderedPk::new(),
            undo,
            redo,
        };
        change.recount();
        change
    }

    fn recount(&mut self) {
        self.cc = self.redo.len() as u16;
        self.start_col = self.redo.iter().map(|c| c.column_id).min().unwrap_or(0);
    }

    /// Returns whether this change is a whole mutation rather than a
    /// fragment still waiting for its continuation.
    pub fn completed(&self) -> bool {
        use row_flags::*;

        if self.uflag & UNDO_CONTINUED != 0 {
            return false;
        }
        match self.op {
            opcode::INSERT | opcode::ROW_CHAIN => {
                self.iflag & (FIRST | LAST) == (FIRST | LAST) && self.iflag & NEXT_CONT == 0
            }
            opcode::UPDATE => self.iflag & NEXT_CONT == 0,
            _ => true,
        }
    }

    /// Returns whether `self` is the next fragment of `head`.
    pub fn continues(&self, head: &RowChange) -> bool {
        if self.object_id != head.object_id || self.scn <= head.scn {
            return false;
        }
        self.iflag & row_flags::PREV_CONT != 0
            || self.op == opcode::ROW_CHAIN
            || head.uflag & UNDO_CONTINUED != 0
    }

    /// Folds a later fragment into this one.
    ///
    /// Columns and key sets are unioned by column id with `later` winning.
    /// Continuation bits are taken from `later`; the remaining flag bits
    /// accumulate.
    pub fn combine(&mut self, later: RowChange) {
        merge_row(&mut self.undo, later.undo);
        merge_row(&mut self.redo, later.redo);
        self.old_pk.extend(later.old_pk);
        self.new_pk.extend(later.new_pk);

        let next_cont = later.iflag & row_flags::NEXT_CONT;
        self.iflag = ((self.iflag | later.iflag) & !row_flags::NEXT_CONT) | next_cont;
        let undo_cont = later.uflag & UNDO_CONTINUED;
        self.uflag = ((self.uflag | later.uflag) & !UNDO_CONTINUED) | undo_cont;

        self.recount();
    }
}

fn merge_row(base: &mut Row, later: Row) {
    for column in later {
        match base.iter_mut().find(|c| c.column_id == column.column_id) {
            Some(existing) => *existing = column,
            None => base.push(column),
        }
    }
}

impl PartialEq for RowChange {
    fn eq(&self, other: &Self) -> bool {
        self.scn == other.scn
    }
}

impl Eq for RowChange {}

impl PartialOrd for RowChange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RowChange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scn.cmp(&other.scn)
    }
}
