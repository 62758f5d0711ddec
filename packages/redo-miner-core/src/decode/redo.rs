//! Redo (after-image) interpretation of row-layer changes.

use tracing::trace;

use crate::decode::columns::decode_columns;
use crate::error::MinerError;
use crate::opcode;
use crate::record::layout::{InsertRowPiece, RowOp, UpdateRowPiece};
use crate::record::ChangeHeader;
use crate::types::Row;

/// Row flag reported for operations whose row piece carries none.
pub const DEFAULT_ROW_FLAG: u8 = 0x0C;

/// View over a row-layer change.
///
/// Parts: 1 transaction block redo, 2 row operation, 3.. column data
/// (update: column numbers at 3, columns from 4).
#[derive(Debug, Clone, Copy)]
pub struct DmlChange<'a> {
    change: &'a ChangeHeader,
}

impl<'a> DmlChange<'a> {
    pub fn new(change: &'a ChangeHeader) -> Result<Self, MinerError> {
        if change.layer() != opcode::LAYER_ROW {
            return Err(MinerError::malformed(
                "row change",
                format!("opcode {:#06x} is not a row operation", change.op_code()),
            ));
        }
        Ok(Self { change })
    }

    pub fn op_code(&self) -> u16 {
        self.change.op_code()
    }

    pub fn row_op(&self) -> Result<RowOp, MinerError> {
        RowOp::read(self.change.part(2)?)
    }

    /// Flag byte of the row piece, or `DEFAULT_ROW_FLAG` when the
    /// operation has no row piece.
    pub fn row_flag(&self) -> Result<u8, MinerError> {
        match self.op_code() {
            opcode::INSERT | opcode::ROW_CHAIN | opcode::MULTI_INSERT => {
                Ok(InsertRowPiece::read(self.change.part(2)?)?.flag)
            }
            opcode::UPDATE => Ok(UpdateRowPiece::read(self.change.part(2)?)?.flag),
            _ => Ok(DEFAULT_ROW_FLAG),
        }
    }

    /// Decodes the after-image.
    ///
    /// Always a single row; operations without redo columns give an empty one.
    pub fn make_up_redo_cols(&self) -> Result<Vec<Row>, MinerError> {
        let row = match self.op_code() {
            opcode::INSERT => {
                let irp = InsertRowPiece::read(self.change.part(2)?)?;
                decode_columns(
                    None,
                    irp.column_count as usize,
                    self.change,
                    3,
                    irp.op.xtype,
                    false,
                )?
            }
            opcode::UPDATE => {
                let urp = UpdateRowPiece::read(self.change.part(2)?)?;
                let nchanged = urp.nchanged as usize;
                if nchanged == 0 {
                    Row::new()
                } else {
                    decode_columns(
                        Some(self.change.part(3)?),
                        nchanged,
                        self.change,
                        4,
                        urp.op.xtype,
                        false,
                    )?
                }
            }
            op => {
                trace!("No redo columns for opcode {:#06x}", op);
                Row::new()
            }
        };
        Ok(vec![row])
    }
}
