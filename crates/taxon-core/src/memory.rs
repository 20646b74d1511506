//! In-memory tree store.
//!
//! Implements [`TreeStore`] over a process-local row map. Used for tests,
//! for offline sessions, and to exercise save atomicity through fault
//! injection.
//!
//! ## Usage
//!
//! ```rust
//! use taxon_core::memory::MemoryTreeStore;
//! use taxon_core::TreeSession;
//! use uuid::Uuid;
//!
//! # tokio_test_block(async {
//! let store = MemoryTreeStore::new();
//! let vocab = Uuid::new_v4();
//! let a = store.insert_entry(vocab, None, 0, "A");
//! let b = store.insert_entry(vocab, None, 1, "B");
//!
//! let mut session = TreeSession::new(store.clone());
//! session.load(vocab).await.unwrap();
//! session.record_move(a, None, 1, &[b, a]);
//! session.save().await.unwrap();
//! assert_eq!(store.get(a).unwrap().rank, 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntryLabels, EntryNode, Ledger, VocabularyEntry};
use crate::traits::TreeStore;
use crate::uuid_utils::new_v7;
use crate::{slug, tree};

/// Shared in-memory store. Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryTreeStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    rows: HashMap<Uuid, VocabularyEntry>,
    /// Fail the next batch after this many row writes.
    fail_after: Option<usize>,
    fail_next_load: bool,
    committed_batches: usize,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a row as-is.
    pub fn insert(&self, entry: VocabularyEntry) {
        self.state().rows.insert(entry.id, entry);
    }

    /// Insert a single-label ("en") entry and return its id.
    pub fn insert_entry(
        &self,
        vocabulary_id: Uuid,
        parent_id: Option<Uuid>,
        rank: u32,
        label: &str,
    ) -> Uuid {
        let labels: EntryLabels = [("en".to_string(), label.to_string())].into();
        let parent_slug = parent_id.and_then(|p| self.get(p)).map(|p| p.entry_value);
        let now = Utc::now();
        let entry = VocabularyEntry {
            id: new_v7(),
            vocabulary_id,
            parent_id,
            entry_value: slug::derive(None, parent_slug.as_deref(), &labels),
            entry_labels: labels,
            rank,
            created_at_utc: now,
            updated_at_utc: now,
        };
        let id = entry.id;
        self.insert(entry);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<VocabularyEntry> {
        self.state().rows.get(&id).cloned()
    }

    /// Remove a row, turning its children into roots.
    pub fn remove(&self, id: Uuid) -> Option<VocabularyEntry> {
        let mut state = self.state();
        let removed = state.rows.remove(&id);
        for row in state.rows.values_mut() {
            if row.parent_id == Some(id) {
                row.parent_id = None;
            }
        }
        removed
    }

    /// Make the next batch fail after `writes` row updates.
    ///
    /// The failed batch leaves every row unchanged.
    pub fn fail_after(&self, writes: usize) {
        self.state().fail_after = Some(writes);
    }

    /// Make the next `load_tree` call fail.
    pub fn fail_next_load(&self) {
        self.state().fail_next_load = true;
    }

    /// Number of batches committed so far.
    pub fn batch_count(&self) -> usize {
        self.state().committed_batches
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn load_tree(&self, vocabulary_id: Uuid) -> Result<Vec<EntryNode>> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_load) {
            return Err(Error::Storage("injected load failure".to_string()));
        }
        let rows = state
            .rows
            .values()
            .filter(|row| row.vocabulary_id == vocabulary_id)
            .cloned()
            .collect();
        Ok(tree::build_forest(rows))
    }

    async fn apply_batch(&self, vocabulary_id: Uuid, updates: &Ledger) -> Result<u64> {
        let mut state = self.state();
        let fail_after = state.fail_after.take();

        // Stage on a copy so any failure leaves the committed rows untouched.
        let mut staged = state.rows.clone();
        let mut writes = 0usize;
        let now = Utc::now();

        for (id, update) in updates {
            if fail_after.is_some_and(|limit| writes >= limit) {
                return Err(Error::Storage(format!(
                    "injected failure after {} writes",
                    writes
                )));
            }

            if !staged
                .get(id)
                .is_some_and(|row| row.vocabulary_id == vocabulary_id)
            {
                trace!(
                    subsystem = "core",
                    component = "memory_store",
                    op = "apply_batch",
                    entry_id = %id,
                    vocabulary_id = %vocabulary_id,
                    "Skipping entry outside vocabulary"
                );
                continue;
            }

            if let Some(Some(parent_id)) = update.parent_id {
                let parent_ok = staged
                    .get(&parent_id)
                    .is_some_and(|parent| parent.vocabulary_id == vocabulary_id);
                if !parent_ok {
                    return Err(Error::Storage(format!(
                        "parent {} of entry {} does not exist in vocabulary {}",
                        parent_id, id, vocabulary_id
                    )));
                }
            }

            if let Some(row) = staged.get_mut(id) {
                if let Some(parent_id) = update.parent_id {
                    row.parent_id = parent_id;
                }
                if let Some(rank) = update.rank {
                    row.rank = rank;
                }
                row.updated_at_utc = now;
                writes += 1;
            }
        }

        state.rows = staged;
        state.committed_batches += 1;
        Ok(writes as u64)
    }
}
