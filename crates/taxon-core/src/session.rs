//! Tree reconciliation engine.
//!
//! A [`TreeSession`] holds the last-loaded forest of one vocabulary and a
//! ledger of pending `{parent_id, rank}` changes. Drag gestures are recorded
//! into the ledger without I/O; repeated gestures on the same entry coalesce
//! into a single ledger row. [`TreeSession::save`] validates the ledger,
//! renumbers sibling ranks, and submits one batch to the store.
//!
//! Sessions are single-writer: one caller drives `record_move` and `save`
//! in order. Dropping a session before saving discards its ledger.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntryNode, EntryUpdate, Ledger, SaveOutcome};
use crate::traits::TreeStore;
use crate::tree;

/// Reconciliation engine for one vocabulary edit screen.
pub struct TreeSession<S: TreeStore> {
    store: S,
    vocabulary_id: Option<Uuid>,
    snapshot: Vec<EntryNode>,
    /// Set when a committed save could not reload the snapshot.
    stale: bool,
    ledger: Ledger,
}

/// Position of an entry as last loaded.
#[derive(Debug, Clone, Copy)]
struct Placement {
    parent_id: Option<Uuid>,
    rank: u32,
    /// Pre-order display index, used as the final tie-breaker.
    order: usize,
}

impl<S: TreeStore> TreeSession<S> {
    /// Create an empty session over `store`. Call [`load`](Self::load) before
    /// recording moves.
    pub fn new(store: S) -> Self {
        Self {
            store,
            vocabulary_id: None,
            snapshot: Vec::new(),
            stale: false,
            ledger: Ledger::new(),
        }
    }

    /// Load (or reload) a vocabulary's tree and clear the ledger.
    pub async fn load(&mut self, vocabulary_id: Uuid) -> Result<()> {
        let start = Instant::now();
        let snapshot = self.store.load_tree(vocabulary_id).await?;

        debug!(
            subsystem = "core",
            component = "tree_session",
            op = "load",
            vocabulary_id = %vocabulary_id,
            entry_count = tree::count_nodes(&snapshot),
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded vocabulary tree"
        );

        self.vocabulary_id = Some(vocabulary_id);
        self.snapshot = snapshot;
        self.stale = false;
        self.ledger.clear();
        Ok(())
    }

    /// The forest as last loaded from the store.
    pub fn snapshot(&self) -> &[EntryNode] {
        &self.snapshot
    }

    /// Pending changes not yet persisted.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.ledger.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }

    /// Drop all pending changes without touching the store.
    pub fn discard(&mut self) {
        self.ledger.clear();
    }

    /// Record one drag-and-drop move.
    ///
    /// `sibling_ids` lists the children of `new_parent_id` after the drop,
    /// in display order, and is expected to contain `item_id` at
    /// `new_rank`. Every listed sibling gets its index as rank and
    /// `new_parent_id` as parent; fields recorded earlier for other ids are
    /// kept, and later values win for the same field. If `item_id` is missing
    /// from `sibling_ids`, `new_rank` is recorded for it instead.
    pub fn record_move(
        &mut self,
        item_id: Uuid,
        new_parent_id: Option<Uuid>,
        new_rank: u32,
        sibling_ids: &[Uuid],
    ) {
        self.ledger.entry(item_id).or_default().merge(EntryUpdate {
            parent_id: Some(new_parent_id),
            rank: None,
        });

        let mut item_listed = false;
        for (index, sibling_id) in sibling_ids.iter().enumerate() {
            item_listed |= *sibling_id == item_id;
            self.ledger.entry(*sibling_id).or_default().merge(EntryUpdate {
                parent_id: Some(new_parent_id),
                rank: Some(u32::try_from(index).unwrap_or(u32::MAX)),
            });
        }

        if !item_listed {
            if let Some(update) = self.ledger.get_mut(&item_id) {
                update.rank = Some(new_rank);
            }
        }

        debug!(
            subsystem = "core",
            component = "tree_session",
            op = "record_move",
            entry_id = %item_id,
            parent_id = ?new_parent_id,
            rank = new_rank,
            sibling_count = sibling_ids.len(),
            pending_count = self.ledger.len(),
            "Recorded move"
        );
    }

    /// Sibling order a drop of `item_id` under `new_parent_id` at `new_rank`
    /// would produce, computed from the loaded snapshot.
    ///
    /// Useful for adapters that have no drag library to report the order.
    pub fn siblings_after_move(
        &self,
        item_id: Uuid,
        new_parent_id: Option<Uuid>,
        new_rank: u32,
    ) -> Vec<Uuid> {
        let mut siblings: Vec<Uuid> = tree::child_ids(&self.snapshot, new_parent_id)
            .into_iter()
            .filter(|id| *id != item_id)
            .collect();
        let at = (new_rank as usize).min(siblings.len());
        siblings.insert(at, item_id);
        siblings
    }

    /// Whether the snapshot may lag the store because the reload after the
    /// last save failed. The next [`save`](Self::save) reloads it first.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Persist the ledger as one atomic batch.
    ///
    /// Returns [`SaveOutcome::NoChanges`] without touching the store when
    /// nothing is pending. On success the ledger is cleared and the snapshot
    /// reloaded. On any error (no loaded vocabulary, a detected cycle, or a
    /// storage failure that rolled the batch back) the ledger is kept so the
    /// caller can retry.
    pub async fn save(&mut self) -> Result<SaveOutcome> {
        if self.ledger.is_empty() {
            debug!(
                subsystem = "core",
                component = "tree_session",
                op = "save",
                "Nothing to save"
            );
            return Ok(SaveOutcome::NoChanges);
        }

        let Some(vocabulary_id) = self.vocabulary_id else {
            return Err(Error::InvalidInput(
                "Load a vocabulary before saving".to_string(),
            ));
        };

        let start = Instant::now();
        if self.stale {
            self.snapshot = self.store.load_tree(vocabulary_id).await?;
            self.stale = false;
            debug!(
                subsystem = "core",
                component = "tree_session",
                op = "reload",
                vocabulary_id = %vocabulary_id,
                "Reloaded stale snapshot before planning"
            );
        }

        let batch = match self.plan_batch() {
            Ok(batch) => batch,
            Err(e) => {
                warn!(
                    subsystem = "core",
                    component = "tree_session",
                    op = "save",
                    pending_count = self.ledger.len(),
                    error = %e,
                    "Save rejected"
                );
                return Err(e);
            }
        };

        let affected = match self.store.apply_batch(vocabulary_id, &batch).await {
            Ok(affected) => affected,
            Err(e) => {
                warn!(
                    subsystem = "core",
                    component = "tree_session",
                    op = "save",
                    pending_count = self.ledger.len(),
                    batch_size = batch.len(),
                    error = %e,
                    "Save failed, ledger kept for retry"
                );
                return Err(e);
            }
        };

        self.ledger.clear();

        match self.store.load_tree(vocabulary_id).await {
            Ok(snapshot) => self.snapshot = snapshot,
            Err(e) => {
                self.stale = true;
                warn!(
                    subsystem = "core",
                    component = "tree_session",
                    op = "reload",
                    vocabulary_id = %vocabulary_id,
                    error = %e,
                    "Saved but could not reload snapshot"
                );
            }
        }

        info!(
            subsystem = "core",
            component = "tree_session",
            op = "save",
            vocabulary_id = %vocabulary_id,
            batch_size = batch.len(),
            affected_count = affected,
            duration_ms = start.elapsed().as_millis() as u64,
            "Saved tree order"
        );

        Ok(SaveOutcome::Saved { affected })
    }

    /// Compute the batch `save` would submit, without I/O.
    ///
    /// Rejects a ledger that would make an entry its own ancestor, then
    /// renumbers every sibling group the ledger touches (old and new
    /// parents) to a contiguous `0..n` sequence. Ties on rank put ledger
    /// entries first, then snapshot order. The batch holds every ledger row
    /// plus untouched siblings whose rank shifted. Ledger rows for ids not in
    /// the snapshot (unknown, or from another vocabulary) are left out.
    pub fn plan_batch(&self) -> Result<Ledger> {
        let placements = self.placements();

        let effective_parent = |id: Uuid| -> Option<Uuid> {
            match self.ledger.get(&id).and_then(|u| u.parent_id) {
                Some(parent) => parent,
                None => placements.get(&id).and_then(|p| p.parent_id),
            }
        };
        let effective_rank = |id: Uuid| -> u32 {
            self.ledger
                .get(&id)
                .and_then(|u| u.rank)
                .or_else(|| placements.get(&id).map(|p| p.rank))
                .unwrap_or(0)
        };

        // Ancestor walk per reparented entry. The step bound stops walks
        // that enter a cycle not containing the entry itself; that cycle is
        // reported when its own member is checked.
        for (id, update) in &self.ledger {
            if update.parent_id.is_none() || !placements.contains_key(id) {
                continue;
            }
            let mut current = effective_parent(*id);
            let mut steps = 0;
            while let Some(ancestor) = current {
                if ancestor == *id {
                    return Err(Error::CycleDetected(*id));
                }
                steps += 1;
                if steps > placements.len() {
                    break;
                }
                current = effective_parent(ancestor);
            }
        }

        let mut groups: BTreeSet<Option<Uuid>> = BTreeSet::new();
        for id in self.ledger.keys() {
            if let Some(placement) = placements.get(id) {
                groups.insert(placement.parent_id);
                groups.insert(effective_parent(*id));
            }
        }

        let mut members: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
        for id in placements.keys() {
            let parent = effective_parent(*id);
            if groups.contains(&parent) {
                members.entry(parent).or_default().push(*id);
            }
        }

        let mut batch = Ledger::new();
        for id in self.ledger.keys().filter(|id| !placements.contains_key(id)) {
            debug!(
                subsystem = "core",
                component = "tree_session",
                op = "plan_batch",
                entry_id = %id,
                "Skipping entry outside snapshot"
            );
        }

        for (_, mut group) in members {
            group.sort_by_key(|id| {
                (
                    effective_rank(*id),
                    !self.ledger.contains_key(id),
                    placements[id].order,
                )
            });
            for (index, id) in group.into_iter().enumerate() {
                let rank = u32::try_from(index).unwrap_or(u32::MAX);
                match self.ledger.get(&id) {
                    Some(update) => {
                        batch.insert(
                            id,
                            EntryUpdate {
                                parent_id: update.parent_id,
                                rank: Some(rank),
                            },
                        );
                    }
                    None if placements[&id].rank != rank => {
                        debug!(
                            subsystem = "core",
                            component = "tree_session",
                            op = "renormalize",
                            entry_id = %id,
                            from = placements[&id].rank,
                            to = rank,
                            "Shifted untouched sibling"
                        );
                        batch.insert(
                            id,
                            EntryUpdate {
                                parent_id: None,
                                rank: Some(rank),
                            },
                        );
                    }
                    None => {}
                }
            }
        }

        Ok(batch)
    }

    fn placements(&self) -> HashMap<Uuid, Placement> {
        tree::flatten(&self.snapshot)
            .into_iter()
            .enumerate()
            .map(|(order, (_, node))| {
                (
                    node.id(),
                    Placement {
                        parent_id: node.entry.parent_id,
                        rank: node.entry.rank,
                        order,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTreeStore;

    fn session_with(store: &MemoryTreeStore) -> TreeSession<MemoryTreeStore> {
        TreeSession::new(store.clone())
    }

    #[tokio::test]
    async fn test_record_move_sets_parent_and_sibling_ranks() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");
        let c = store.insert_entry(vocab, Some(a), 0, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(c, Some(b), 0, &[c]);

        let update = session.ledger()[&c];
        assert_eq!(update.parent_id, Some(Some(b)));
        assert_eq!(update.rank, Some(0));
        assert_eq!(session.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_record_move_is_idempotent() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");

        let mut once = session_with(&store);
        once.load(vocab).await.unwrap();
        once.record_move(a, None, 1, &[b, a]);

        let mut twice = session_with(&store);
        twice.load(vocab).await.unwrap();
        twice.record_move(a, None, 1, &[b, a]);
        twice.record_move(a, None, 1, &[b, a]);

        assert_eq!(once.ledger(), twice.ledger());
    }

    #[tokio::test]
    async fn test_record_move_coalesces_per_entry() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");
        let c = store.insert_entry(vocab, None, 2, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(c, Some(a), 0, &[c]);
        session.record_move(c, Some(b), 0, &[c]);
        session.record_move(c, None, 0, &[c, a, b]);

        let rows: Vec<_> = session.ledger().keys().filter(|id| **id == c).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(session.ledger()[&c].parent_id, Some(None));
        assert_eq!(session.ledger()[&c].rank, Some(0));
    }

    #[tokio::test]
    async fn test_record_move_keeps_earlier_fields() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");
        let c = store.insert_entry(vocab, Some(a), 0, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(c, Some(b), 0, &[c]);
        session.record_move(a, None, 1, &[b, a]);

        assert_eq!(session.ledger()[&c].parent_id, Some(Some(b)));
        assert_eq!(session.ledger()[&a].rank, Some(1));
        assert_eq!(session.ledger()[&b].rank, Some(0));
        assert_eq!(session.pending_count(), 3);
    }

    #[tokio::test]
    async fn test_record_move_uses_new_rank_when_item_not_listed() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(a, None, 4, &[]);

        assert_eq!(session.ledger()[&a].rank, Some(4));
    }

    #[tokio::test]
    async fn test_siblings_after_move() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");
        let c = store.insert_entry(vocab, None, 2, "C");
        let d = store.insert_entry(vocab, Some(a), 0, "D");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();

        assert_eq!(session.siblings_after_move(a, None, 2), vec![b, c, a]);
        assert_eq!(session.siblings_after_move(c, Some(a), 0), vec![c, d]);
        assert_eq!(session.siblings_after_move(c, Some(a), 99), vec![d, c]);
    }

    #[tokio::test]
    async fn test_plan_batch_rejects_cycle() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, Some(a), 0, "B");
        let c = store.insert_entry(vocab, Some(b), 0, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(a, Some(c), 0, &[a]);

        match session.plan_batch() {
            Err(Error::CycleDetected(id)) => assert_eq!(id, a),
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plan_batch_rejects_self_parent() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(a, Some(a), 0, &[a]);

        assert!(matches!(session.plan_batch(), Err(Error::CycleDetected(_))));
    }

    #[tokio::test]
    async fn test_plan_batch_closes_gap_in_old_parent() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");
        let c = store.insert_entry(vocab, None, 2, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(a, Some(c), 0, &[a]);

        let batch = session.plan_batch().unwrap();
        assert_eq!(batch[&a].parent_id, Some(Some(c)));
        assert_eq!(batch[&a].rank, Some(0));
        assert_eq!(batch[&b], EntryUpdate { parent_id: None, rank: Some(0) });
        assert_eq!(batch[&c], EntryUpdate { parent_id: None, rank: Some(1) });
    }

    #[tokio::test]
    async fn test_plan_batch_renumbers_duplicate_ranks() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let x = store.insert_entry(vocab, Some(a), 0, "X");
        let c = store.insert_entry(vocab, None, 1, "C");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        // Caller omits the existing child X from the sibling list
        session.record_move(c, Some(a), 0, &[c]);

        let batch = session.plan_batch().unwrap();
        assert_eq!(batch[&c].rank, Some(0));
        assert_eq!(batch[&x].rank, Some(1));
        assert!(!batch.contains_key(&a));
    }

    #[tokio::test]
    async fn test_plan_batch_leaves_out_ids_outside_snapshot() {
        let store = MemoryTreeStore::new();
        let fauna = Uuid::new_v4();
        let flora = Uuid::new_v4();
        let a = store.insert_entry(fauna, None, 0, "A");
        let oak = store.insert_entry(flora, None, 0, "Oak");
        let ghost = Uuid::new_v4();

        let mut session = session_with(&store);
        session.load(fauna).await.unwrap();
        session.record_move(ghost, None, 7, &[]);
        session.record_move(oak, None, 1, &[a, oak]);

        let batch = session.plan_batch().unwrap();
        assert!(!batch.contains_key(&ghost));
        assert!(!batch.contains_key(&oak));
        assert_eq!(batch[&a].rank, Some(0));
    }

    #[tokio::test]
    async fn test_save_without_load_keeps_ledger() {
        let store = MemoryTreeStore::new();
        let a = store.insert_entry(Uuid::new_v4(), None, 0, "A");

        let mut session = session_with(&store);
        session.record_move(a, None, 1, &[]);

        assert!(matches!(
            session.save().await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(store.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_discard_clears_ledger_without_writes() {
        let store = MemoryTreeStore::new();
        let vocab = Uuid::new_v4();
        let a = store.insert_entry(vocab, None, 0, "A");
        let b = store.insert_entry(vocab, None, 1, "B");

        let mut session = session_with(&store);
        session.load(vocab).await.unwrap();
        session.record_move(a, None, 1, &[b, a]);
        session.discard();

        assert!(!session.has_pending_changes());
        assert_eq!(store.batch_count(), 0);
    }
}
