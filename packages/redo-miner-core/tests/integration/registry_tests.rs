//! Watermark, garbage collection and ordering properties of the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ntest::timeout;
use proptest::prelude::*;

use redo_miner_core::opcode;
use redo_miner_core::transaction::{Checkpoint, NoSchema, RowChange, Transaction};
use redo_miner_core::{Row, Scn, TimePoint, TransactionRegistry, Xid};

use super::helpers::*;

#[test]
fn test_restart_watermark_follows_oldest_open_start() {
    let registry = TransactionRegistry::default();
    let a = Xid(1);
    let b = Xid(2);

    registry
        .add_to_transaction(&begin_with_insert(100, a, b"a"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&begin_with_insert(120, b, b"b"), &NoSchema)
        .unwrap();
    assert_eq!(registry.restart_time_point().scn, Scn::new(100));

    registry
        .add_to_transaction(&commit_record(130, a), &NoSchema)
        .unwrap();
    assert_eq!(registry.restart_time_point(), TimePoint::new(Scn::new(120), 1));

    registry
        .add_to_transaction(&commit_record(140, b), &NoSchema)
        .unwrap();
    assert!(registry.restart_time_point().empty());
    assert_eq!(registry.committed_count(), 2);
}

#[test]
fn test_restart_watermark_unchanged_by_younger_commit() {
    let registry = TransactionRegistry::default();
    let a = Xid(1);
    let b = Xid(2);

    registry
        .add_to_transaction(&begin_with_insert(100, a, b"a"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&begin_with_insert(120, b, b"b"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&commit_record(130, b), &NoSchema)
        .unwrap();
    assert_eq!(registry.restart_time_point().scn, Scn::new(100));
    assert_eq!(registry.pending_start_count(), 1);
}

#[test]
fn test_shared_start_scn_retires_once_per_transaction() {
    let registry = TransactionRegistry::default();
    let a = Xid(1);
    let b = Xid(2);

    registry
        .add_to_transaction(&record(100, vec![begin(a), begin(b)]), &NoSchema)
        .unwrap();
    assert_eq!(registry.pending_start_count(), 2);

    registry
        .add_to_transaction(&commit_record(110, a), &NoSchema)
        .unwrap();
    assert_eq!(registry.restart_time_point().scn, Scn::new(100));

    registry
        .add_to_transaction(&commit_record(111, b), &NoSchema)
        .unwrap();
    assert!(registry.restart_time_point().empty());
}

#[test]
fn test_commit_watermark_ignores_older_commits() {
    let registry = TransactionRegistry::default();
    registry
        .add_to_transaction(&commit_record(200, Xid(1)), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&commit_record(150, Xid(2)), &NoSchema)
        .unwrap();
    assert_eq!(registry.last_commit_time_point().scn, Scn::new(200));
}

#[test]
fn test_remove_uncompleted_trans() {
    let registry = TransactionRegistry::default();

    // fragments of transactions that began before the log was opened
    for n in 0..3u64 {
        let xid = Xid(100 + n);
        registry
            .add_to_transaction(
                &record(
                    10 + n,
                    vec![undo_for_insert(xid, OBJECT_ID), insert(&[b"late"])],
                ),
                &NoSchema,
            )
            .unwrap();
    }
    registry
        .add_to_transaction(&begin_with_insert(20, Xid(1), b"ok"), &NoSchema)
        .unwrap();
    assert_eq!(registry.open_count(), 4);

    assert_eq!(registry.remove_uncompleted_trans(), 3);
    assert_eq!(registry.open_count(), 1);
    assert!(registry.open_transaction(Xid(1)).is_some());
    assert_eq!(registry.remove_uncompleted_trans(), 0);
}

#[test]
fn test_commits_sharing_an_scn_are_all_kept() {
    let registry = TransactionRegistry::default();
    let a = Xid(1);
    let b = Xid(2);
    registry
        .add_to_transaction(&begin_with_insert(10, a, b"a"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&begin_with_insert(11, b, b"b"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&record(20, vec![commit(a, 0), commit(b, 0)]), &NoSchema)
        .unwrap();

    let keys = registry.with_committed(|committed| committed.keys().copied().collect::<Vec<_>>());
    assert_eq!(keys, vec![Scn::new(20), Scn::with_sub(20, 1)]);
    let drained = registry.drain_committed();
    assert_eq!(drained.len(), 2);
    assert_eq!(registry.committed_count(), 0);
}

#[test]
fn test_dba_map_and_checkpoint() {
    let registry = TransactionRegistry::default();
    let xid = Xid::from_parts(9, 3, 77);
    registry
        .add_to_transaction(&begin_with_insert(10, xid, b"a"), &NoSchema)
        .unwrap();
    assert_eq!(registry.usn_for_dba(0x0040_0009), Some(9));
    assert_eq!(registry.usn_for_dba(0x0040_0001), None);

    let checkpoint = registry.checkpoint();
    assert_eq!(checkpoint.open_transactions, 1);
    assert_eq!(checkpoint.restart.scn, Scn::new(10));
    let json = checkpoint.to_json().unwrap();
    let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, checkpoint);
}

#[test]
fn test_shutdown_clears_state() {
    let registry = TransactionRegistry::default();
    registry
        .add_to_transaction(&begin_with_insert(10, Xid(1), b"a"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&begin_with_insert(11, Xid(2), b"b"), &NoSchema)
        .unwrap();
    registry
        .add_to_transaction(&commit_record(12, Xid(1)), &NoSchema)
        .unwrap();

    let report = registry.shutdown();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.still_open, 1);
    assert_eq!(registry.open_count(), 0);
    assert_eq!(registry.pending_start_count(), 0);
    assert!(registry.restart_time_point().empty());
}

#[timeout(10000)]
#[test]
fn test_concurrent_watermark_readers() {
    let registry = Arc::new(TransactionRegistry::default());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last_seen = Scn::default();
                let mut reads = 0u64;
                while !done.load(Ordering::Acquire) {
                    let point = registry.last_commit_time_point();
                    assert!(point.scn >= last_seen, "commit watermark went backwards");
                    assert!(point.empty() || point.epoch == 1, "torn watermark {}", point);
                    last_seen = point.scn;
                    let _ = registry.restart_time_point();
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for n in 0..500u64 {
        let xid = Xid(n);
        let scn = 1_000 + n * 3;
        registry
            .add_to_transaction(&begin_with_insert(scn, xid, b"v"), &NoSchema)
            .unwrap();
        registry
            .add_to_transaction(&commit_record(scn + 1, xid), &NoSchema)
            .unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(registry.committed_count(), 500);
    assert_eq!(
        registry.last_commit_time_point().scn,
        Scn::new(1_000 + 499 * 3 + 1)
    );
}

proptest! {
    #[test]
    fn prop_changes_iterate_in_scn_order(scns in proptest::collection::vec(1u64..10_000, 1..64)) {
        let mut txn = Transaction::new(Xid(1));
        for (i, scn) in scns.iter().enumerate() {
            let mut change = RowChange::new(
                Scn::new(*scn),
                (i % 5) as u32,
                opcode::UPDATE,
                Row::new(),
                Row::new(),
            );
            change.iflag = 0x2c;
            txn.merge(change);
        }
        let ordered: Vec<Scn> = txn.changes().map(|c| c.scn).collect();
        prop_assert_eq!(ordered.len(), scns.len());
        prop_assert!(ordered.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_commit_watermark_never_decreases(
        scns in proptest::collection::vec(1u64..1_000_000, 1..40)
    ) {
        let registry = TransactionRegistry::default();
        let mut previous = registry.last_commit_time_point().scn;
        for (i, scn) in scns.iter().enumerate() {
            registry
                .add_to_transaction(&commit_record(*scn, Xid(i as u64)), &NoSchema)
                .unwrap();
            let current = registry.last_commit_time_point().scn;
            prop_assert!(current >= previous);
            previous = current;
        }
        let max = scns.iter().copied().max().unwrap_or(0);
        prop_assert_eq!(previous, Scn::new(max));
    }

    #[test]
    fn prop_restart_is_oldest_open_start(
        starts in proptest::collection::btree_set(1u64..100_000, 1..20),
        commit_mask in proptest::collection::vec(any::<bool>(), 20),
    ) {
        let registry = TransactionRegistry::default();
        let starts: Vec<u64> = starts.into_iter().collect();
        for (i, scn) in starts.iter().enumerate() {
            registry
                .add_to_transaction(&begin_with_insert(*scn, Xid(i as u64), b"v"), &NoSchema)
                .unwrap();
        }
        let mut commit_scn = 200_000u64;
        for (i, _) in starts.iter().enumerate().filter(|(i, _)| commit_mask[*i]) {
            registry
                .add_to_transaction(&commit_record(commit_scn, Xid(i as u64)), &NoSchema)
                .unwrap();
            commit_scn += 1;
        }

        let oldest_open = starts
            .iter()
            .enumerate()
            .filter(|(i, _)| !commit_mask[*i])
            .map(|(_, scn)| *scn)
            .min();
        match oldest_open {
            Some(scn) => prop_assert_eq!(registry.restart_time_point().scn, Scn::new(scn)),
            None => prop_assert!(registry.restart_time_point().empty()),
        }
    }
}
