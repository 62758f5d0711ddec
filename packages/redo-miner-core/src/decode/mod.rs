//! Opcode interpreters: locate column data inside a change vector and
//! decode it into before-image and after-image rows.

pub mod columns;
mod redo;
mod undo;

pub use columns::{decode_columns, decode_len_prefixed, decode_no_len_prefix};
pub use redo::{DmlChange, DEFAULT_ROW_FLAG};
pub use undo::UndoChange;
