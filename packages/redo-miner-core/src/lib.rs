//! Redo change-vector decoding and transaction reconstruction.
//!
//! Decodes opcode-tagged change vectors into undo/redo column lists,
//! assembles row changes into transactions keyed by XID, and tracks
//! commit and restart watermarks for change-data-capture consumers.

pub mod config;
pub mod decode;
pub mod error;
pub mod opcode;
pub mod record;
pub mod session;
pub mod transaction;
pub mod types;

pub use config::{FatalPolicy, MinerConfig};
pub use error::MinerError;
pub use record::{ChangeHeader, RecordBuf};
pub use session::{MiningSession, RecordOutcome, SessionStats};
pub use transaction::{
    Checkpoint, CommitState, RowChange, SchemaCache, SchemaLookup, TabDef, Transaction,
    TransactionRegistry,
};
pub use types::{ColumnChange, Row, Scn, TimePoint, Xid};
