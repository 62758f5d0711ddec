//! End-to-end decoding and reconstruction scenarios.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use redo_miner_core::decode::{decode_columns, DmlChange, UndoChange};
use redo_miner_core::opcode;
use redo_miner_core::record::layout::{encode_len_prefixed, encode_u16_array};
use redo_miner_core::record::ChangeBuilder;
use redo_miner_core::transaction::{NoSchema, SchemaCache, TabDef};
use redo_miner_core::{
    ColumnChange, FatalPolicy, MinerConfig, MinerError, MiningSession, RecordOutcome, Scn,
    TimePoint, TransactionRegistry, Xid,
};

use super::helpers::*;

#[test]
fn test_length_prefixed_insert_columns() {
    let change = ChangeBuilder::new(opcode::INSERT)
        .part(encode_u16_array(&[1, 2]))
        .part(encode_len_prefixed(&[0x01]))
        .part(encode_len_prefixed(&[0x02, 0x03]))
        .build()
        .unwrap();
    let row = decode_columns(Some(change.part(1).unwrap()), 2, &change, 2, 0x80, false).unwrap();

    let decoded: Vec<(u16, usize, Vec<u8>)> = row
        .iter()
        .map(|c| (c.column_id, c.len(), c.data.clone()))
        .collect();
    assert_eq!(
        decoded,
        vec![(1, 1, vec![0x01]), (2, 2, vec![0x02, 0x03])]
    );
}

#[test]
fn test_update_redo_single_column() {
    let change = update(&[3], &[&[0xDE, 0xAD, 0xBE, 0xEF]]);
    let rows = DmlChange::new(&change)
        .unwrap()
        .make_up_redo_cols()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 1);
    assert_eq!(rows[0][0].column_id, 3);
    assert_eq!(rows[0][0].len(), 4);
}

#[test]
fn test_update_undo_carries_before_image() {
    let xid = Xid(42);
    let change = undo_for_update(xid, OBJECT_ID, &[3], &[b"old!"]);
    let undo = UndoChange::new(&change).unwrap();
    assert_eq!(undo.xid().unwrap(), xid);
    assert_eq!(undo.object_id().unwrap(), OBJECT_ID);
    let rows = undo.make_up_undo().unwrap();
    assert_eq!(rows, vec![vec![ColumnChange::new(3, b"old!".to_vec())]]);
}

#[test]
fn test_transaction_reconstruction() {
    let registry = TransactionRegistry::default();
    let xid = Xid(42);

    registry
        .add_to_transaction(&begin_with_insert(100, xid, b"row-1"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(
            &record(
                105,
                vec![
                    undo_for_update(xid, OBJECT_ID, &[0], &[b"row-1"]),
                    update(&[0], &[b"row-2"]),
                ],
            ),
            &NoSchema,
        )
        .unwrap();
    assert_eq!(registry.open_count(), 1);
    assert_eq!(registry.committed_count(), 0);

    registry
        .add_to_transaction(&commit_record(110, xid), &NoSchema)
        .unwrap();
    assert_eq!(registry.open_count(), 0);

    registry.with_committed(|committed| {
        assert_eq!(committed.len(), 1);
        let (key, txn) = committed.iter().next().unwrap();
        assert_eq!(*key, Scn::new(110));
        assert_eq!(txn.xid, xid);
        assert_eq!(txn.start_scn, Scn::new(100));
        assert_eq!(txn.commit_scn, Scn::new(110));
        assert!(txn.is_complete());

        let changes: Vec<_> = txn.changes().collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].scn, Scn::new(100));
        assert_eq!(changes[0].op, opcode::INSERT);
        assert_eq!(changes[0].redo, vec![ColumnChange::new(0, b"row-1".to_vec())]);
        assert_eq!(changes[1].scn, Scn::new(105));
        assert_eq!(changes[1].op, opcode::UPDATE);
        assert_eq!(changes[1].undo, vec![ColumnChange::new(0, b"row-1".to_vec())]);
        assert_eq!(changes[1].redo, vec![ColumnChange::new(0, b"row-2".to_vec())]);
    });

    assert_eq!(
        registry.last_commit_time_point(),
        TimePoint::new(Scn::new(110), 1)
    );
    assert!(registry.restart_time_point().empty());
}

#[test]
fn test_primary_keys_from_schema() {
    let schema = SchemaCache::from_defs([TabDef {
        object_id: OBJECT_ID,
        name: "ORDERS".to_string(),
        pk_columns: vec![0],
        ..Default::default()
    }]);
    let registry = TransactionRegistry::default();
    let xid = Xid(5);

    registry
        .add_to_transaction(
            &record(
                10,
                vec![
                    begin(xid),
                    undo_for_insert(xid, OBJECT_ID),
                    insert(&[b"pk", b"payload"]),
                ],
            ),
            &schema,
        )
        .unwrap();

    let txn = registry.open_transaction(xid).unwrap();
    let change = txn.changes().next().unwrap();
    assert_eq!(change.cc, 2);
    assert!(change.old_pk.is_empty());
    let pk: Vec<u16> = change.new_pk.keys().copied().collect();
    assert_eq!(pk, vec![0]);
    assert_eq!(change.new_pk[&0].data, b"pk".to_vec());
}

#[test]
fn test_rollback_discards_transaction() {
    let registry = TransactionRegistry::default();
    let xid = Xid(8);
    registry
        .add_to_transaction(&begin_with_insert(100, xid, b"x"), &NoSchema)
        .unwrap();
    assert_eq!(registry.pending_start_count(), 1);

    registry
        .add_to_transaction(&record(120, vec![commit(xid, 0x04)]), &NoSchema)
        .unwrap();
    assert_eq!(registry.open_count(), 0);
    assert_eq!(registry.committed_count(), 0);
    assert_eq!(registry.pending_start_count(), 0);
    assert!(registry.restart_time_point().empty());
}

#[test]
fn test_empty_transactions_are_dropped_unless_kept() {
    let xid = Xid(11);

    let registry = TransactionRegistry::default();
    registry
        .add_to_transaction(&record(10, vec![begin(xid)]), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&commit_record(20, xid), &NoSchema)
        .unwrap();
    assert_eq!(registry.committed_count(), 0);

    let registry = TransactionRegistry::new(MinerConfig {
        keep_empty_transactions: true,
        ..Default::default()
    });
    registry
        .add_to_transaction(&record(10, vec![begin(xid)]), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&commit_record(20, xid), &NoSchema)
        .unwrap();
    assert_eq!(registry.committed_count(), 1);
}

#[test]
fn test_failed_record_leaves_registry_untouched() {
    let registry = TransactionRegistry::default();
    let xid = Xid(3);
    let truncated_undo = ChangeBuilder::new(opcode::UNDO)
        .part(vec![0u8; 6])
        .build()
        .unwrap();

    let err = registry
        .add_to_transaction(
            &record(10, vec![begin(xid), truncated_undo, insert(&[b"a"])]),
            &NoSchema,
        )
        .unwrap_err();
    assert!(matches!(err, MinerError::MalformedRecord { .. }));
    assert_eq!(registry.open_count(), 0);
    assert_eq!(registry.pending_start_count(), 0);
    assert!(registry.restart_time_point().empty());
}

#[test]
fn test_skipped_changes() {
    let registry = TransactionRegistry::default();
    let xid = Xid(4);
    let unknown = ChangeBuilder::new(0x0B04).build().unwrap();
    let ddl = ChangeBuilder::new(opcode::DDL).build().unwrap();
    let lone_undo = undo_for_insert(xid, OBJECT_ID);

    let applied = registry
        .add_to_transaction(&record(10, vec![unknown, ddl, lone_undo]), &NoSchema)
        .unwrap();
    assert_eq!(applied, 0);
    assert_eq!(registry.open_count(), 0);
}

#[test]
fn test_strict_commit_flags() {
    let xid = Xid(6);
    let strict = TransactionRegistry::default();
    strict
        .add_to_transaction(&begin_with_insert(10, xid, b"a"), &NoSchema)
        .unwrap();
    assert!(strict
        .add_to_transaction(&record(20, vec![commit(xid, 0x01)]), &NoSchema)
        .is_err());
    assert_eq!(strict.open_count(), 1);

    let lenient = TransactionRegistry::new(MinerConfig {
        strict_commit_flags: false,
        ..Default::default()
    });
    lenient
        .add_to_transaction(&begin_with_insert(10, xid, b"a"), &NoSchema)
        .unwrap();
    lenient
        .add_to_transaction(&record(20, vec![commit(xid, 0x01)]), &NoSchema)
        .unwrap();
    assert_eq!(lenient.committed_count(), 1);
}

#[test]
fn test_session_replay() {
    let config = MinerConfig {
        fatal_policy: FatalPolicy::Propagate,
        ..Default::default()
    };
    let mut session = MiningSession::new(config, Arc::new(NoSchema));
    let a = Xid(1);
    let b = Xid(2);

    let records = vec![
        begin_with_insert(100, a, b"a1"),
        begin_with_insert(101, b, b"b1"),
        record(102, vec![commit(a, 0x99)]),
        commit_record(103, a),
    ];
    let stats = session.process_all(&records).unwrap();
    assert_eq!(stats.records, 4);
    assert_eq!(stats.applied, 3);
    assert_eq!(stats.skipped, 1);

    assert!(matches!(
        session.process(&record(104, vec![commit(b, 0x99)])).unwrap(),
        RecordOutcome::Skipped(_)
    ));

    let report = session.finish();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.committed[0].xid, a);
    assert_eq!(report.still_open, 1);
}

#[test]
fn test_record_with_two_row_changes_keeps_both() {
    let registry = TransactionRegistry::default();
    let xid = Xid(42);

    registry
        .add_to_transaction(
            &record(
                100,
                vec![
                    begin(xid),
                    undo_for_insert(xid, 7001),
                    insert(&[b"A-row"]),
                    undo_for_insert(xid, 9009),
                    insert(&[b"B-row"]),
                ],
            ),
            &NoSchema,
        )
        .unwrap();
    registry
        .add_to_transaction(&commit_record(110, xid), &NoSchema)
        .unwrap();

    let txn = registry.drain_committed().pop().unwrap();
    let changes: Vec<(Scn, u32, Vec<ColumnChange>)> = txn
        .changes()
        .map(|c| (c.scn, c.object_id, c.redo.clone()))
        .collect();
    assert_eq!(
        changes,
        vec![
            (
                Scn::new(100),
                7001,
                vec![ColumnChange::new(0, b"A-row".to_vec())]
            ),
            (
                Scn::with_sub(100, 1),
                9009,
                vec![ColumnChange::new(0, b"B-row".to_vec())]
            ),
        ]
    );
}
