//! Row changes, transactions, and the registry that assembles them.

mod registry;
mod row_change;
mod schema;
#[allow(clippy::module_inception)]
mod transaction;

pub use registry::{Checkpoint, ShutdownReport, TransactionRegistry};
pub use row_change::{row_flags, RowChange, UNDO_CONTINUED};
pub use schema::{find_pk, NoSchema, SchemaCache, SchemaLookup, TabDef};
pub use transaction::{CommitState, Transaction, ROLLBACK_FLAG, VALID_COMMIT_FLAGS};
