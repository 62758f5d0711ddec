//! Undo (before-image) interpretation of transaction-layer undo changes.

use tracing::{error, trace};

use crate::decode::columns::{decode_columns, decode_no_len_prefix};
use crate::error::MinerError;
use crate::opcode::{self, row_op_code};
use crate::record::layout::{
    DeleteRowPiece, InsertRowPiece, RowOp, SupplementalHeader, UndoBlockInfo, UndoHeader,
    UpdateRowPiece,
};
use crate::record::ChangeHeader;
use crate::types::{Row, Xid};

const INSERT_CODE: u8 = row_op_code(opcode::INSERT);
const DELETE_CODE: u8 = row_op_code(opcode::DELETE);
const UPDATE_CODE: u8 = row_op_code(opcode::UPDATE);
const MULTI_INSERT_CODE: u8 = row_op_code(opcode::MULTI_INSERT);

/// View over an undo change (opcode 5.1).
///
/// Parts: 1 undo header, 2 undo block info, 3 transaction block redo,
/// 4 row operation, 5.. column data.
#[derive(Debug, Clone, Copy)]
pub struct UndoChange<'a> {
    change: &'a ChangeHeader,
}

impl<'a> UndoChange<'a> {
    pub fn new(change: &'a ChangeHeader) -> Result<Self, MinerError> {
        if change.op_code() != opcode::UNDO {
            return Err(MinerError::malformed(
                "undo change",
                format!("opcode {:#06x} is not an undo change", change.op_code()),
            ));
        }
        Ok(Self { change })
    }

    pub fn header(&self) -> Result<UndoHeader, MinerError> {
        UndoHeader::read(self.change.part(1)?)
    }

    pub fn block_info(&self) -> Result<UndoBlockInfo, MinerError> {
        UndoBlockInfo::read(self.change.part(2)?)
    }

    pub fn xid(&self) -> Result<Xid, MinerError> {
        Ok(self.header()?.xid)
    }

    pub fn object_id(&self) -> Result<u32, MinerError> {
        Ok(self.block_info()?.object_id)
    }

    pub fn data_object_id(&self) -> Result<u32, MinerError> {
        Ok(self.block_info()?.data_object_id)
    }

    /// Decodes the before-image rows.
    ///
    /// Operations without undo column data yield an empty list. A
    /// multi-row insert cannot be reconstructed per row and fails with
    /// `UnsupportedOpcode`.
    pub fn make_up_undo(&self) -> Result<Vec<Row>, MinerError> {
        let row_op_part = self.change.part(4)?;
        let row_op = RowOp::read(row_op_part)?;

        let row = match row_op.code() {
            // undo of a plain delete re-inserts the row
            INSERT_CODE => {
                let irp = InsertRowPiece::read(row_op_part)?;
                let info = self.block_info()?;
                let cc = irp.column_count as usize;
                let mut row = Row::new();
                if cc != 0 {
                    row = decode_columns(None, cc, self.change, 5, irp.op.xtype, false)?;
                }
                let part_no = if info.is_legacy_format() {
                    7 + cc
                } else {
                    6 + cc
                };
                if irp.op.xtype & RowOp::SUPPLEMENTAL != 0 {
                    row.extend(self.supplemental_columns(part_no)?);
                }
                row
            }
            MULTI_INSERT_CODE => {
                error!(
                    "Multi-row insert in undo of change at dba {:#x}, cannot reconstruct rows",
                    self.change.dba()
                );
                return Err(MinerError::UnsupportedOpcode {
                    op: opcode::MULTI_INSERT,
                    path: "undo",
                });
            }
            UPDATE_CODE => {
                let urp = UpdateRowPiece::read(row_op_part)?;
                let nchanged = urp.nchanged as usize;
                let mut row = decode_columns(
                    Some(self.change.part(5)?),
                    nchanged,
                    self.change,
                    6,
                    urp.op.xtype,
                    false,
                )?;
                let mut part_no = 6 + nchanged;
                if urp.op.opcode & RowOp::EXTRA_PART != 0 {
                    part_no += 1;
                }
                if urp.op.opcode & RowOp::SUPPLEMENTAL != 0 {
                    row.extend(self.supplemental_columns(part_no)?);
                }
                row
            }
            DELETE_CODE => {
                let drp = DeleteRowPiece::read(row_op_part)?;
                let sup = if drp.op.opcode & RowOp::SUPPLEMENTAL != 0 {
                    Some(SupplementalHeader::read(self.change.part(5)?)?)
                } else {
                    None
                };
                match sup {
                    Some(sup) if sup.total_cols > 0 => decode_no_len_prefix(
                        Some(self.change.part(6)?),
                        sup.total_cols as usize,
                        self.change,
                        8,
                        true,
                    )?,
                    _ => Row::new(),
                }
            }
            code => {
                trace!("No undo columns for row op code {:#04x}", code);
                return Ok(Vec::new());
            }
        };

        Ok(vec![row])
    }

    /// Supplemental section: header at `part_no`, column numbers after it,
    /// then the length array part, then one part per column.
    fn supplemental_columns(&self, part_no: usize) -> Result<Row, MinerError> {
        let sup = SupplementalHeader::read(self.change.part(part_no)?)?;
        if sup.total_cols == 0 {
            return Ok(Row::new());
        }
        decode_no_len_prefix(
            Some(self.change.part(part_no + 1)?),
            sup.total_cols as usize,
            self.change,
            part_no + 3,
            true,
        )
    }
}
