use std::fmt;

use serde::{Deserialize, Serialize};

/// System change number: the ordering and durability watermark of the log.
///
/// `sub` orders records that share the same `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scn {
    pub value: u64,
    pub sub: u32,
}

impl Scn {
    /// Creates an SCN with sub-position 0.
    pub const fn new(value: u64) -> Self {
        Self { value, sub: 0 }
    }

    /// Creates an SCN at a given sub-position.
    pub const fn with_sub(value: u64, sub: u32) -> Self {
        Self { value, sub }
    }

    /// Builds an SCN from the base/wrap halves carried in change headers.
    pub const fn from_parts(base: u32, wrap: u16) -> Self {
        Self::new(((wrap as u64) << 32) | base as u64)
    }

    /// Returns whether this is the zero SCN.
    pub fn empty(&self) -> bool {
        self.value == 0 && self.sub == 0
    }
}

impl fmt::Display for Scn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub == 0 {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}.{}", self.value, self.sub)
        }
    }
}

/// Transaction identifier: `usn << 48 | slot << 32 | sqn`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Xid(pub u64);

impl Xid {
    pub const fn from_parts(usn: u16, slot: u16, sqn: u32) -> Self {
        Xid(((usn as u64) << 48) | ((slot as u64) << 32) | sqn as u64)
    }

    /// Undo segment number.
    pub fn usn(&self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn slot(&self) -> u16 {
        (self.0 >> 32) as u16
    }

    pub fn sqn(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}.{:#x}.{:#x}", self.usn(), self.slot(), self.sqn())
    }
}

/// A (scn, epoch) pair: either the last-commit or the restart watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePoint {
    pub scn: Scn,
    pub epoch: u32,
}

impl TimePoint {
    pub fn new(scn: Scn, epoch: u32) -> Self {
        Self { scn, epoch }
    }

    pub fn empty(&self) -> bool {
        self.epoch == 0 && self.scn.empty()
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scn={} epoch={}", self.scn, self.epoch)
    }
}
