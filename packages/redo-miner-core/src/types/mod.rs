//! Sequence numbers, transaction ids, and decoded column values.

mod column;
mod scn;

pub use column::{ColumnChange, OrderedPk, Row};
pub use scn::{Scn, TimePoint, Xid};
