use bytes::Bytes;

use crate::error::MinerError;
use crate::record::layout::PartReader;
use crate::types::Scn;

/// Size of the fixed header preceding the length array.
pub const CHANGE_HEADER_SIZE: usize = 24;

pub(crate) fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// One framed change vector: a fixed header, a length array, and parts.
///
/// Parts are 1-indexed. The buffer is shared, so cloning is cheap and
/// decoded columns copy their bytes out.
#[derive(Debug, Clone)]
pub struct ChangeHeader {
    bytes: Bytes,
    layer: u8,
    code: u8,
    class: u16,
    afn: u16,
    dba: u32,
    scn: Scn,
    seq: u8,
    typ: u8,
    /// Byte offset of each part's payload
    offsets: Vec<usize>,
    /// Declared length of each part
    lengths: Vec<u16>,
}

impl ChangeHeader {
    /// Validates the framing of `bytes` and indexes its parts.
    pub fn parse(bytes: Bytes) -> Result<Self, MinerError> {
        if bytes.len() < CHANGE_HEADER_SIZE + 2 {
            return Err(MinerError::malformed(
                "change header",
                format!("{} bytes is shorter than the fixed header", bytes.len()),
            ));
        }

        let mut r = PartReader::new(&bytes[..CHANGE_HEADER_SIZE], "change header");
        let layer = r.u8()?;
        let code = r.u8()?;
        let class = r.u16()?;
        let afn = r.u16()?;
        r.skip(2)?;
        let dba = r.u32()?;
        let scn_base = r.u32()?;
        let scn_wrap = r.u16()?;
        let seq = r.u8()?;
        let typ = r.u8()?;

        let mut r = PartReader::new(&bytes[CHANGE_HEADER_SIZE..], "length array");
        let array_size = r.u16()? as usize;
        if array_size < 2 || array_size % 2 != 0 {
            return Err(MinerError::malformed(
                "length array",
                format!("invalid array size {}", array_size),
            ));
        }
        let part_count = (array_size - 2) / 2;
        let mut lengths = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            lengths.push(r.u16()?);
        }

        let mut offsets = Vec::with_capacity(part_count);
        let mut offset = align4(CHANGE_HEADER_SIZE + array_size);
        for (index, len) in lengths.iter().enumerate() {
            let end = offset + *len as usize;
            if end > bytes.len() {
                return Err(MinerError::malformed(
                    "change parts",
                    format!(
                        "part {} ends at {} past buffer of {} bytes",
                        index + 1,
                        end,
                        bytes.len()
                    ),
                ));
            }
            offsets.push(offset);
            offset = align4(end);
        }

        Ok(Self {
            bytes,
            layer,
            code,
            class,
            afn,
            dba,
            scn: Scn::from_parts(scn_base, scn_wrap),
            seq,
            typ,
            offsets,
            lengths,
        })
    }

    /// Opcode as `layer << 8 | code`.
    pub fn op_code(&self) -> u16 {
        ((self.layer as u16) << 8) | self.code as u16
    }

    pub fn layer(&self) -> u8 {
        self.layer
    }

    pub fn class(&self) -> u16 {
        self.class
    }

    /// Absolute file number.
    pub fn afn(&self) -> u16 {
        self.afn
    }

    /// Data block address the change applies to.
    pub fn dba(&self) -> u32 {
        self.dba
    }

    /// SCN stamped on the change itself (not the record's).
    pub fn scn(&self) -> Scn {
        self.scn
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn typ(&self) -> u8 {
        self.typ
    }

    pub fn part_count(&self) -> usize {
        self.lengths.len()
    }

    fn check_index(&self, index: usize) -> Result<(), MinerError> {
        if index == 0 || index > self.lengths.len() {
            return Err(MinerError::malformed(
                "part index",
                format!(
                    "part {} requested from change {:#06x} with {} parts",
                    index,
                    self.op_code(),
                    self.lengths.len()
                ),
            ));
        }
        Ok(())
    }

    /// Payload of part `index` (1-based).
    pub fn part(&self, index: usize) -> Result<&[u8], MinerError> {
        self.check_index(index)?;
        let start = self.offsets[index - 1];
        let len = self.lengths[index - 1] as usize;
        Ok(&self.bytes[start..start + len])
    }

    /// Length array view starting at part `index`.
    ///
    /// Entry `k` of the view is the length of part `index + k`.
    pub fn part_len(&self, index: usize) -> Result<LengthArray<'_>, MinerError> {
        self.check_index(index)?;
        Ok(LengthArray {
            first_part: index,
            lengths: &self.lengths[index - 1..],
        })
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Borrowed slice of the length array.
#[derive(Debug, Clone, Copy)]
pub struct LengthArray<'a> {
    first_part: usize,
    lengths: &'a [u16],
}

impl LengthArray<'_> {
    pub fn get(&self, k: usize) -> Result<u16, MinerError> {
        self.lengths.get(k).copied().ok_or_else(|| {
            MinerError::malformed(
                "length array",
                format!("part {} past the last part", self.first_part + k),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}
