use bytes::{BufMut, Bytes, BytesMut};

use crate::error::MinerError;
use crate::record::change_header::{align4, ChangeHeader, CHANGE_HEADER_SIZE};
use crate::types::Scn;

/// Encodes change vectors in the framed layout `ChangeHeader::parse` reads.
#[derive(Debug, Clone)]
pub struct ChangeBuilder {
    op: u16,
    class: u16,
    afn: u16,
    dba: u32,
    scn: Scn,
    parts: Vec<Bytes>,
}

impl ChangeBuilder {
    pub fn new(op: u16) -> Self {
        Self {
            op,
            class: 1,
            afn: 1,
            dba: 0,
            scn: Scn::default(),
            parts: Vec::new(),
        }
    }

    pub fn class(mut self, class: u16) -> Self {
        self.class = class;
        self
    }

    pub fn afn(mut self, afn: u16) -> Self {
        self.afn = afn;
        self
    }

    pub fn dba(mut self, dba: u32) -> Self {
        self.dba = dba;
        self
    }

    pub fn scn(mut self, scn: Scn) -> Self {
        self.scn = scn;
        self
    }

    /// Appends the next part.
    pub fn part(mut self, part: impl Into<Bytes>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn parts<I, P>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        self.parts.extend(parts.into_iter().map(Into::into));
        self
    }

    /// Produces the framed bytes.
    ///
    /// Part lengths are 16-bit, so a part over `u16::MAX` bytes (or more
    /// parts than the length array can count) is rejected.
    pub fn encode(&self) -> Result<Bytes, MinerError> {
        let array_size = 2 + 2 * self.parts.len();
        if array_size > u16::MAX as usize {
            return Err(MinerError::malformed(
                "change builder",
                format!("{} parts exceed the length array", self.parts.len()),
            ));
        }
        if let Some((i, part)) = self
            .parts
            .iter()
            .enumerate()
            .find(|(_, part)| part.len() > u16::MAX as usize)
        {
            return Err(MinerError::malformed(
                "change builder",
                format!("part {} is {} bytes", i + 1, part.len()),
            ));
        }
        let body: usize = self.parts.iter().map(|p| align4(p.len())).sum();
        let mut buf = BytesMut::with_capacity(align4(CHANGE_HEADER_SIZE + array_size) + body);

        buf.put_u8((self.op >> 8) as u8);
        buf.put_u8(self.op as u8);
        buf.put_u16_le(self.class);
        buf.put_u16_le(self.afn);
        buf.put_u16_le(0);
        buf.put_u32_le(self.dba);
        buf.put_u32_le(self.scn.value as u32);
        buf.put_u16_le((self.scn.value >> 32) as u16);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u32_le(0);

        buf.put_u16_le(array_size as u16);
        for part in &self.parts {
            buf.put_u16_le(part.len() as u16);
        }
        pad(&mut buf);

        for part in &self.parts {
            buf.put_slice(part);
            pad(&mut buf);
        }
        Ok(buf.freeze())
    }

    /// Encodes and parses back into a `ChangeHeader`.
    pub fn build(&self) -> Result<ChangeHeader, MinerError> {
        ChangeHeader::parse(self.encode()?)
    }
}

fn pad(buf: &mut BytesMut) {
    let padded = align4(buf.len());
    buf.put_bytes(0, padded - buf.len());
}
