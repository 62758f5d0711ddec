//! Bounds-checked readers for the fixed structures carried in change parts.
//!
//! Every reader validates the remaining length before interpreting bytes,
//! so a short part fails with `MalformedRecord` instead of reading past it.
//! The matching `encode` methods produce the same little-endian layout.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MinerError;
use crate::types::Xid;

/// Sequential little-endian reader over one part.
pub struct PartReader<'a> {
    buf: &'a [u8],
    context: &'static str,
}

impl<'a> PartReader<'a> {
    pub fn new(buf: &'a [u8], context: &'static str) -> Self {
        Self { buf, context }
    }

    fn ensure(&self, needed: usize) -> Result<(), MinerError> {
        if self.buf.remaining() < needed {
            return Err(MinerError::malformed(
                self.context,
                format!(
                    "needs {} more bytes, {} remaining",
                    needed,
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, MinerError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, MinerError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn i16(&mut self) -> Result<i16, MinerError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn u32(&mut self) -> Result<u32, MinerError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), MinerError> {
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

/// Reads entry `index` of a `u16` array part.
pub fn u16_at(part: &[u8], index: usize, context: &'static str) -> Result<u16, MinerError> {
    let start = index * 2;
    match part.get(start..start + 2) {
        Some(raw) => Ok(u16::from_le_bytes([raw[0], raw[1]])),
        None => Err(MinerError::malformed(
            context,
            format!("entry {} past end of {}-byte array", index, part.len()),
        )),
    }
}

/// Encodes a `u16` array part.
pub fn encode_u16_array(values: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 2);
    for value in values {
        buf.put_u16_le(*value);
    }
    buf.freeze()
}

/// Encodes a column part with an inline 2-byte length prefix.
///
/// The prefix only holds lengths up to `u16::MAX`. Longer data cannot form
/// a valid part, and `ChangeBuilder::encode` rejects the oversize part.
pub fn encode_len_prefixed(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + data.len());
    buf.put_u16_le(data.len() as u16);
    buf.put_slice(data);
    buf.freeze()
}

/// Undo header (first part of an undo change).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoHeader {
    pub size: u16,
    pub space: u16,
    pub flag: u16,
    pub xid: Xid,
    pub seq: u16,
    pub rec: u8,
}

impl UndoHeader {
    pub const SIZE: usize = 20;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "undo header");
        let size = r.u16()?;
        let space = r.u16()?;
        let flag = r.u16()?;
        r.skip(2)?;
        let usn = r.u16()?;
        let slot = r.u16()?;
        let sqn = r.u32()?;
        let seq = r.u16()?;
        let rec = r.u8()?;
        Ok(Self {
            size,
            space,
            flag,
            xid: Xid::from_parts(usn, slot, sqn),
            seq,
            rec,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.size);
        buf.put_u16_le(self.space);
        buf.put_u16_le(self.flag);
        buf.put_u16_le(0);
        buf.put_u16_le(self.xid.usn());
        buf.put_u16_le(self.xid.slot());
        buf.put_u32_le(self.xid.sqn());
        buf.put_u16_le(self.seq);
        buf.put_u8(self.rec);
        buf.put_u8(0);
        buf.freeze()
    }
}

/// Undo block info (second part of an undo change).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoBlockInfo {
    pub op_major: u8,
    pub op_minor: u8,
    pub slot: u8,
    pub rci: u8,
    pub object_id: u32,
    pub data_object_id: u32,
    pub tsn: u32,
    pub flag: u16,
}

impl UndoBlockInfo {
    pub const SIZE: usize = 20;

    /// Version pair of the historical format whose supplemental section
    /// sits one part further out.
    pub const LEGACY_FORMAT: (u8, u8) = (0x05, 0x01);

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "undo block info");
        Ok(Self {
            op_major: r.u8()?,
            op_minor: r.u8()?,
            slot: r.u8()?,
            rci: r.u8()?,
            object_id: r.u32()?,
            data_object_id: r.u32()?,
            tsn: r.u32()?,
            flag: r.u16()?,
        })
    }

    pub fn is_legacy_format(&self) -> bool {
        (self.op_major, self.op_minor) == Self::LEGACY_FORMAT
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(self.op_major);
        buf.put_u8(self.op_minor);
        buf.put_u8(self.slot);
        buf.put_u8(self.rci);
        buf.put_u32_le(self.object_id);
        buf.put_u32_le(self.data_object_id);
        buf.put_u32_le(self.tsn);
        buf.put_u16_le(self.flag);
        buf.put_u16_le(0);
        buf.freeze()
    }
}

/// Header shared by every row operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOp {
    pub bdba: u32,
    pub hdba: u32,
    pub maxfr: u16,
    pub opcode: u8,
    pub xtype: u8,
    pub itli: u8,
    pub ispac: u8,
}

impl RowOp {
    pub const SIZE: usize = 16;

    /// Supplemental-log section follows (opcode byte on update/delete, xtype on insert).
    pub const SUPPLEMENTAL: u8 = 0x20;
    /// An extra part precedes the supplemental section (update).
    pub const EXTRA_PART: u8 = 0x40;
    /// Columns carry an inline length prefix (xtype).
    pub const LEN_PREFIXED: u8 = 0x80;

    fn read_from(r: &mut PartReader<'_>) -> Result<Self, MinerError> {
        let op = Self {
            bdba: r.u32()?,
            hdba: r.u32()?,
            maxfr: r.u16()?,
            opcode: r.u8()?,
            xtype: r.u8()?,
            itli: r.u8()?,
            ispac: r.u8()?,
        };
        r.skip(2)?;
        Ok(op)
    }

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        Self::read_from(&mut PartReader::new(part, "row op"))
    }

    /// Low five bits of the opcode byte, as matched by the undo path.
    pub fn code(&self) -> u8 {
        self.opcode & 0x1f
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.bdba);
        buf.put_u32_le(self.hdba);
        buf.put_u16_le(self.maxfr);
        buf.put_u8(self.opcode);
        buf.put_u8(self.xtype);
        buf.put_u8(self.itli);
        buf.put_u8(self.ispac);
        buf.put_u16_le(0);
    }
}

/// Insert row piece.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertRowPiece {
    pub op: RowOp,
    pub flag: u8,
    pub lock: u8,
    pub column_count: u8,
    pub cki: u8,
    pub hrid_bdba: u32,
    pub hrid_slot: u16,
    pub nrid_slot: u16,
    pub nrid_bdba: u32,
    pub size: u16,
    pub slot: u16,
}

impl InsertRowPiece {
    pub const SIZE: usize = 36;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "insert row piece");
        Ok(Self {
            op: RowOp::read_from(&mut r)?,
            flag: r.u8()?,
            lock: r.u8()?,
            column_count: r.u8()?,
            cki: r.u8()?,
            hrid_bdba: r.u32()?,
            hrid_slot: r.u16()?,
            nrid_slot: r.u16()?,
            nrid_bdba: r.u32()?,
            size: r.u16()?,
            slot: r.u16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.op.put(&mut buf);
        buf.put_u8(self.flag);
        buf.put_u8(self.lock);
        buf.put_u8(self.column_count);
        buf.put_u8(self.cki);
        buf.put_u32_le(self.hrid_bdba);
        buf.put_u16_le(self.hrid_slot);
        buf.put_u16_le(self.nrid_slot);
        buf.put_u32_le(self.nrid_bdba);
        buf.put_u16_le(self.size);
        buf.put_u16_le(self.slot);
        buf.freeze()
    }
}

/// Update row piece.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateRowPiece {
    pub op: RowOp,
    pub flag: u8,
    pub lock: u8,
    pub ckix: u8,
    pub tabn: u8,
    pub slot: u16,
    pub ncol: u8,
    pub nchanged: u8,
    pub size: i16,
}

impl UpdateRowPiece {
    pub const SIZE: usize = 28;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "update row piece");
        Ok(Self {
            op: RowOp::read_from(&mut r)?,
            flag: r.u8()?,
            lock: r.u8()?,
            ckix: r.u8()?,
            tabn: r.u8()?,
            slot: r.u16()?,
            ncol: r.u8()?,
            nchanged: r.u8()?,
            size: r.i16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.op.put(&mut buf);
        buf.put_u8(self.flag);
        buf.put_u8(self.lock);
        buf.put_u8(self.ckix);
        buf.put_u8(self.tabn);
        buf.put_u16_le(self.slot);
        buf.put_u8(self.ncol);
        buf.put_u8(self.nchanged);
        buf.put_i16_le(self.size);
        buf.put_u16_le(0);
        buf.freeze()
    }
}

/// Delete row piece.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteRowPiece {
    pub op: RowOp,
    pub slot: u16,
    pub tabn: u8,
}

impl DeleteRowPiece {
    pub const SIZE: usize = 20;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "delete row piece");
        Ok(Self {
            op: RowOp::read_from(&mut r)?,
            slot: r.u16()?,
            tabn: r.u8()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.op.put(&mut buf);
        buf.put_u16_le(self.slot);
        buf.put_u8(self.tabn);
        buf.put_u8(0);
        buf.freeze()
    }
}

/// Header of a supplemental-log section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplementalHeader {
    pub fb: u8,
    pub total_cols: u16,
    pub objv: u16,
    pub start_col: u16,
}

impl SupplementalHeader {
    pub const SIZE: usize = 8;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "supplemental header");
        let fb = r.u8()?;
        r.skip(1)?;
        Ok(Self {
            fb,
            total_cols: r.u16()?,
            objv: r.u16()?,
            start_col: r.u16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(self.fb);
        buf.put_u8(0);
        buf.put_u16_le(self.total_cols);
        buf.put_u16_le(self.objv);
        buf.put_u16_le(self.start_col);
        buf.freeze()
    }
}

/// Begin-transaction part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginTxn {
    pub xid: Xid,
    pub uba_dba: u32,
    pub flag: u16,
}

impl BeginTxn {
    pub const SIZE: usize = 16;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "begin transaction");
        let usn = r.u16()?;
        let slot = r.u16()?;
        let sqn = r.u32()?;
        Ok(Self {
            xid: Xid::from_parts(usn, slot, sqn),
            uba_dba: r.u32()?,
            flag: r.u16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.xid.usn());
        buf.put_u16_le(self.xid.slot());
        buf.put_u32_le(self.xid.sqn());
        buf.put_u32_le(self.uba_dba);
        buf.put_u16_le(self.flag);
        buf.put_u16_le(0);
        buf.freeze()
    }
}

/// Commit/rollback part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitTxn {
    pub xid: Xid,
    pub flag: u8,
}

impl CommitTxn {
    pub const SIZE: usize = 16;

    pub fn read(part: &[u8]) -> Result<Self, MinerError> {
        let mut r = PartReader::new(part, "commit");
        let usn = r.u16()?;
        let slot = r.u16()?;
        let sqn = r.u32()?;
        r.skip(4)?;
        Ok(Self {
            xid: Xid::from_parts(usn, slot, sqn),
            flag: r.u8()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.xid.usn());
        buf.put_u16_le(self.xid.slot());
        buf.put_u32_le(self.xid.sqn());
        buf.put_u32_le(0);
        buf.put_u8(self.flag);
        buf.put_slice(&[0, 0, 0]);
        buf.freeze()
    }
}
