/// End-to-end reconciliation tests against the in-memory store.
///
/// Each test drives a full load → record_move → save cycle and checks the
/// persisted rows, the ledger, and the store's batch counter.
use std::collections::BTreeMap;

use taxon_core::{slug, EntryLabels, Error, MemoryTreeStore, SaveOutcome, TreeSession};
use uuid::Uuid;

async fn loaded(store: &MemoryTreeStore, vocab: Uuid) -> TreeSession<MemoryTreeStore> {
    let mut session = TreeSession::new(store.clone());
    session.load(vocab).await.expect("load failed");
    session
}

#[tokio::test]
async fn test_reorder_two_roots() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");

    let mut session = loaded(&store, vocab).await;
    session.record_move(a, None, 1, &[b, a]);
    let outcome = session.save().await.unwrap();

    assert_eq!(outcome, SaveOutcome::Saved { affected: 2 });
    assert_eq!(store.get(a).unwrap().rank, 1);
    assert_eq!(store.get(b).unwrap().rank, 0);
    assert_eq!(store.get(a).unwrap().parent_id, None);
    assert_eq!(store.get(b).unwrap().parent_id, None);
    assert!(!session.has_pending_changes());

    // Snapshot reflects the new order
    let roots: Vec<Uuid> = session.snapshot().iter().map(|n| n.id()).collect();
    assert_eq!(roots, vec![b, a]);
}

#[tokio::test]
async fn test_move_into_new_parent() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");
    let c = store.insert_entry(vocab, None, 2, "C");

    let mut session = loaded(&store, vocab).await;
    session.record_move(c, Some(a), 0, &[c]);
    assert!(session.save().await.unwrap().is_saved());

    let moved = store.get(c).unwrap();
    assert_eq!(moved.parent_id, Some(a));
    assert_eq!(moved.rank, 0);
    assert_eq!(store.get(a).unwrap().rank, 0);
    assert_eq!(store.get(a).unwrap().parent_id, None);
    assert_eq!(store.get(b).unwrap().rank, 1);

    let parent = &session.snapshot()[0];
    assert_eq!(parent.id(), a);
    assert_eq!(parent.children[0].id(), c);
}

#[tokio::test]
async fn test_save_without_changes_skips_store() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    store.insert_entry(vocab, None, 0, "A");

    let mut session = loaded(&store, vocab).await;
    let outcome = session.save().await.unwrap();

    assert_eq!(outcome, SaveOutcome::NoChanges);
    assert_eq!(outcome.notice(), "No changes to save");
    assert_eq!(store.batch_count(), 0);
}

#[tokio::test]
async fn test_failed_save_is_atomic_and_retryable() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");

    let mut session = loaded(&store, vocab).await;
    session.record_move(a, None, 1, &[b, a]);
    let before = session.ledger().clone();

    store.fail_after(1);
    let err = session.save().await.unwrap_err();
    assert!(err.is_storage_failure());

    assert_eq!(store.get(a).unwrap().rank, 0);
    assert_eq!(store.get(b).unwrap().rank, 1);
    assert_eq!(session.ledger(), &before);
    assert_eq!(store.batch_count(), 0);

    let outcome = session.save().await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { affected: 2 });
    assert_eq!(store.get(a).unwrap().rank, 1);
    assert_eq!(store.get(b).unwrap().rank, 0);
    assert_eq!(store.batch_count(), 1);
}

#[tokio::test]
async fn test_cycle_is_rejected_before_write() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, Some(a), 0, "B");

    let mut session = loaded(&store, vocab).await;
    session.record_move(a, Some(b), 0, &[a]);

    let err = session.save().await.unwrap_err();
    assert!(matches!(err, Error::CycleDetected(id) if id == a));
    assert!(!err.is_storage_failure());
    assert_eq!(session.pending_count(), 1);
    assert_eq!(store.batch_count(), 0);
    assert_eq!(store.get(a).unwrap().parent_id, None);
}

#[tokio::test]
async fn test_three_root_reorder_persists() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");
    let c = store.insert_entry(vocab, None, 2, "C");

    let mut session = loaded(&store, vocab).await;
    session.record_move(c, None, 0, &[c, a, b]);
    session.save().await.unwrap();

    assert_eq!(store.get(c).unwrap().rank, 0);
    assert_eq!(store.get(a).unwrap().rank, 1);
    assert_eq!(store.get(b).unwrap().rank, 2);

    // A second session sees the persisted order
    let fresh = loaded(&store, vocab).await;
    let roots: Vec<Uuid> = fresh.snapshot().iter().map(|n| n.id()).collect();
    assert_eq!(roots, vec![c, a, b]);
}

#[tokio::test]
async fn test_ranks_stay_contiguous_after_moves() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");
    let c = store.insert_entry(vocab, None, 2, "C");
    let d = store.insert_entry(vocab, None, 3, "D");

    let mut session = loaded(&store, vocab).await;
    session.record_move(b, Some(a), 0, &[b]);
    session.record_move(d, Some(a), 1, &[b, d]);
    session.save().await.unwrap();

    assert_eq!(store.get(a).unwrap().rank, 0);
    assert_eq!(store.get(c).unwrap().rank, 1);
    assert_eq!(store.get(b).unwrap().rank, 0);
    assert_eq!(store.get(d).unwrap().rank, 1);
}

#[tokio::test]
async fn test_moves_across_sessions_do_not_leak() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");

    let mut first = loaded(&store, vocab).await;
    first.record_move(a, None, 1, &[b, a]);
    drop(first);

    let mut second = loaded(&store, vocab).await;
    assert!(!second.has_pending_changes());
    assert_eq!(second.save().await.unwrap(), SaveOutcome::NoChanges);
    assert_eq!(store.get(a).unwrap().rank, 0);
}

#[tokio::test]
async fn test_save_does_not_touch_other_vocabularies() {
    let store = MemoryTreeStore::new();
    let fauna = Uuid::new_v4();
    let flora = Uuid::new_v4();
    let a = store.insert_entry(fauna, None, 0, "A");
    let trees = store.insert_entry(flora, None, 0, "Trees");
    let oak = store.insert_entry(flora, Some(trees), 0, "Oak");

    let mut session = loaded(&store, fauna).await;
    session.record_move(oak, None, 5, &[a, oak]);
    let outcome = session.save().await.unwrap();

    assert_eq!(outcome, SaveOutcome::Saved { affected: 1 });
    let oak_row = store.get(oak).unwrap();
    assert_eq!(oak_row.vocabulary_id, flora);
    assert_eq!(oak_row.parent_id, Some(trees));
    assert_eq!(oak_row.rank, 0);
    assert_eq!(store.get(a).unwrap().rank, 0);
}

#[tokio::test]
async fn test_failed_reload_refreshes_before_next_save() {
    let store = MemoryTreeStore::new();
    let vocab = Uuid::new_v4();
    let a = store.insert_entry(vocab, None, 0, "A");
    let b = store.insert_entry(vocab, None, 1, "B");
    let c = store.insert_entry(vocab, None, 2, "C");

    let mut session = loaded(&store, vocab).await;
    session.record_move(b, None, 0, &[b, a]);
    store.fail_next_load();
    assert!(session.save().await.unwrap().is_saved());
    assert!(session.is_stale());
    assert_eq!(store.get(a).unwrap().rank, 1);

    // A was at rank 0 in the stale snapshot but is at rank 1 in the store
    session.record_move(b, Some(c), 0, &[b]);
    session.save().await.unwrap();

    assert!(!session.is_stale());
    assert_eq!(store.get(a).unwrap().rank, 0);
    assert_eq!(store.get(c).unwrap().rank, 1);
    assert_eq!(store.get(b).unwrap().parent_id, Some(c));
}

#[test]
fn test_slug_uses_lexicographically_first_locale() {
    let mut labels: EntryLabels = BTreeMap::new();
    labels.insert("fr-BE".to_string(), "Mammifères".to_string());
    labels.insert("en".to_string(), "Mammals".to_string());

    let first = slug::derive(Some("Fauna"), None, &labels);
    let second = slug::derive(Some("Fauna"), None, &labels);
    assert_eq!(first, "FAUNA_MAMMALS");
    assert_eq!(first, second);
}
