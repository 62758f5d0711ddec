//! JSON fixture files of log records with hex-encoded change vectors.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use redo_miner_core::opcode;
use redo_miner_core::record::layout::{
    encode_len_prefixed, encode_u16_array, BeginTxn, CommitTxn, DeleteRowPiece, InsertRowPiece,
    RowOp, UndoBlockInfo, UndoHeader, UpdateRowPiece,
};
use redo_miner_core::record::ChangeBuilder;
use redo_miner_core::{ChangeHeader, MinerError, RecordBuf, Scn, TabDef, Xid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub scn: u64,
    #[serde(default)]
    pub sub: u32,
    pub epoch: u32,
    /// Framed change vectors, hex-encoded
    pub changes: Vec<String>,
}

impl FixtureRecord {
    pub fn from_changes(
        scn: u64,
        epoch: u32,
        changes: &[ChangeBuilder],
    ) -> Result<Self, MinerError> {
        let changes = changes
            .iter()
            .map(|c| c.encode().map(hex::encode))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            scn,
            sub: 0,
            epoch,
            changes,
        })
    }

    pub fn to_record(&self) -> Result<RecordBuf> {
        let changes = self
            .changes
            .iter()
            .enumerate()
            .map(|(i, encoded)| {
                let raw = hex::decode(encoded)
                    .with_context(|| format!("change {} of scn {} is not hex", i, self.scn))?;
                ChangeHeader::parse(Bytes::from(raw))
                    .with_context(|| format!("change {} of scn {} is malformed", i, self.scn))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBuf::new(Scn::with_sub(self.scn, self.sub), self.epoch, changes))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub records: Vec<FixtureRecord>,
}

impl Fixture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    pub fn to_records(&self) -> Result<Vec<RecordBuf>> {
        self.records.iter().map(FixtureRecord::to_record).collect()
    }
}

pub fn load_schema(path: &Path) -> Result<Vec<TabDef>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse schema {}", path.display()))
}

const SAMPLE_OBJECT: u32 = 7001;

fn undo_change(xid: Xid, row_piece: Bytes, columns: &[u16], values: &[&[u8]]) -> ChangeBuilder {
    let mut builder = ChangeBuilder::new(opcode::UNDO)
        .part(
            UndoHeader {
                xid,
                ..Default::default()
            }
            .encode(),
        )
        .part(
            UndoBlockInfo {
                op_major: 0x0B,
                op_minor: 0x01,
                object_id: SAMPLE_OBJECT,
                data_object_id: SAMPLE_OBJECT,
                ..Default::default()
            }
            .encode(),
        )
        .part(Bytes::from(vec![0u8; 8]))
        .part(row_piece);
    if !columns.is_empty() {
        builder = builder
            .part(encode_u16_array(columns))
            .parts(values.iter().map(|v| Bytes::copy_from_slice(v)));
    }
    builder
}

/// Begin with insert, an update, and a commit of one transaction.
pub fn sample() -> Result<Fixture, MinerError> {
    let xid = Xid::from_parts(1, 2, 42);
    let row_op = |code: u8, xtype: u8| RowOp {
        opcode: code,
        xtype,
        ..Default::default()
    };

    let begin = ChangeBuilder::new(opcode::BEGIN_TRANS)
        .dba(0x0040_0001)
        .part(
            BeginTxn {
                xid,
                ..Default::default()
            }
            .encode(),
        );
    let insert_undo = undo_change(
        xid,
        DeleteRowPiece {
            op: row_op(0x03, 0),
            ..Default::default()
        }
        .encode(),
        &[],
        &[],
    );
    let insert = ChangeBuilder::new(opcode::INSERT)
        .part(Bytes::from(vec![0u8; 8]))
        .part(
            InsertRowPiece {
                op: row_op(0x02, RowOp::LEN_PREFIXED),
                flag: 0x2c,
                column_count: 2,
                ..Default::default()
            }
            .encode(),
        )
        .part(encode_len_prefixed(b"1001"))
        .part(encode_len_prefixed(b"pending"));

    let urp = UpdateRowPiece {
        op: row_op(0x05, 0),
        flag: 0x2c,
        ncol: 2,
        nchanged: 1,
        ..Default::default()
    };
    let update_undo = undo_change(xid, urp.encode(), &[1], &[b"pending"]);
    let update = ChangeBuilder::new(opcode::UPDATE)
        .part(Bytes::from(vec![0u8; 8]))
        .part(urp.encode())
        .part(encode_u16_array(&[1]))
        .part(Bytes::from_static(b"shipped"));

    let commit = ChangeBuilder::new(opcode::COMMIT)
        .part(CommitTxn { xid, flag: 0 }.encode());

    Ok(Fixture {
        records: vec![
            FixtureRecord::from_changes(100, 1, &[begin, insert_undo, insert])?,
            FixtureRecord::from_changes(105, 1, &[update_undo, update])?,
            FixtureRecord::from_changes(110, 1, &[commit])?,
        ],
    })
}
