//! Framed change vectors and the records that carry them.

mod builder;
mod change_header;
pub mod layout;

pub use builder::ChangeBuilder;
pub use change_header::{ChangeHeader, LengthArray, CHANGE_HEADER_SIZE};

use crate::types::Scn;

/// One log record as handed over by the log reader.
#[derive(Debug, Clone)]
pub struct RecordBuf {
    /// Position of the record in the log
    pub scn: Scn,
    /// Log generation the record belongs to
    pub epoch: u32,
    /// Change vectors in log order
    pub changes: Vec<ChangeHeader>,
}

impl RecordBuf {
    pub fn new(scn: Scn, epoch: u32, changes: Vec<ChangeHeader>) -> Self {
        Self {
            scn,
            epoch,
            changes,
        }
    }
}
