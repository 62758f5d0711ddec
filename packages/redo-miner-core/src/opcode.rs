//! Recognised change-vector opcodes.
//!
//! An opcode is `layer << 8 | code`. Layer 5 carries transaction control
//! and undo, layer 11 carries row operations, layer 24 carries DDL.

pub const OTHER: u16 = 0x0000;
pub const UNDO: u16 = 0x0501;
pub const BEGIN_TRANS: u16 = 0x0502;
pub const COMMIT: u16 = 0x0504;
pub const NEW_SESSION: u16 = 0x0513;
pub const SWITCH_SESSION: u16 = 0x0514;
pub const INSERT: u16 = 0x0B02;
pub const DELETE: u16 = 0x0B03;
pub const UPDATE: u16 = 0x0B05;
pub const ROW_CHAIN: u16 = 0x0B06;
pub const MFC: u16 = 0x0B07;
pub const CFA: u16 = 0x0B08;
pub const MULTI_INSERT: u16 = 0x0B0B;
pub const MULTI_DELETE: u16 = 0x0B0C;
pub const LMN: u16 = 0x0B10;
pub const DDL: u16 = 0x1801;

/// Layer of transaction-control and undo changes.
pub const LAYER_TXN: u8 = 0x05;
/// Layer of row operations.
pub const LAYER_ROW: u8 = 0x0B;

/// Every opcode the decoder recognises, with a display name.
pub const VALID_OPCODES: [(u16, &str); 16] = [
    (OTHER, "other"),
    (UNDO, "undo"),
    (BEGIN_TRANS, "begin-transaction"),
    (COMMIT, "commit"),
    (NEW_SESSION, "new-session"),
    (SWITCH_SESSION, "switch-session"),
    (INSERT, "insert"),
    (DELETE, "delete"),
    (UPDATE, "update"),
    (ROW_CHAIN, "row-chain"),
    (MFC, "minor-flag-changed"),
    (CFA, "continuous-free-area"),
    (MULTI_INSERT, "multi-row-insert"),
    (MULTI_DELETE, "multi-row-delete"),
    (LMN, "lock-misc"),
    (DDL, "ddl"),
];

/// Returns true iff `op` is one of the recognised opcodes.
pub fn is_valid_opcode(op: u16) -> bool {
    VALID_OPCODES.iter().any(|(valid, _)| *valid == op)
}

/// Returns the display name of a recognised opcode.
pub fn opcode_name(op: u16) -> Option<&'static str> {
    VALID_OPCODES
        .iter()
        .find(|(valid, _)| *valid == op)
        .map(|(_, name)| *name)
}

/// Layer byte of an opcode.
pub fn layer(op: u16) -> u8 {
    (op >> 8) as u8
}

/// Code byte of an opcode, as carried in a row operation header.
pub const fn row_op_code(op: u16) -> u8 {
    (op & 0xff) as u8
}
