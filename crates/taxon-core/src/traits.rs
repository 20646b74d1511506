//! Core traits for taxon storage abstractions.
//!
//! These traits define the interfaces that concrete backends must satisfy,
//! so sessions can run against PostgreSQL or the in-memory store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TREE STORE
// =============================================================================

/// Read/write gateway used by `TreeSession`.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Load a vocabulary's entries as a rank-ordered forest.
    ///
    /// Read-only. An unknown vocabulary yields an empty forest.
    async fn load_tree(&self, vocabulary_id: Uuid) -> Result<Vec<EntryNode>>;

    /// Apply every update inside one transaction, scoped to `vocabulary_id`.
    ///
    /// Only fields present in each update are written. Ids that are unknown
    /// or belong to another vocabulary are skipped rather than failing the
    /// batch. Returns the number of rows changed; on error no row is changed.
    async fn apply_batch(&self, vocabulary_id: Uuid, updates: &Ledger) -> Result<u64>;
}

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for vocabulary CRUD operations.
#[async_trait]
pub trait VocabularyRepository: Send + Sync {
    /// Create a new vocabulary.
    async fn create(&self, name: &str) -> Result<Vocabulary>;

    /// Get a vocabulary by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Vocabulary>>;

    /// List all vocabularies ordered by name.
    async fn list(&self) -> Result<Vec<Vocabulary>>;

    /// Rename a vocabulary. Existing entry slugs are left as they are.
    async fn rename(&self, id: Uuid, name: &str) -> Result<Vocabulary>;

    /// Delete a vocabulary and all of its entries.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for entry lifecycle operations outside drag-and-drop.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Create an entry, deriving its slug from the vocabulary, parent and labels.
    async fn create(&self, req: CreateEntryRequest) -> Result<VocabularyEntry>;

    /// Get an entry by ID.
    async fn get(&self, id: Uuid) -> Result<Option<VocabularyEntry>>;

    /// List a vocabulary's entries flat, ordered by parent then rank.
    async fn list_for_vocabulary(&self, vocabulary_id: Uuid) -> Result<Vec<VocabularyEntry>>;

    /// Edit an entry. Label or parent changes re-derive the slug.
    async fn update(&self, id: Uuid, req: UpdateEntryRequest) -> Result<VocabularyEntry>;

    /// Delete an entry. Its children become roots.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Indented `(id, label)` options for a parent picker, excluding the
    /// subtree of `exclude`.
    async fn parent_options(
        &self,
        vocabulary_id: Uuid,
        locale: &str,
        exclude: Option<Uuid>,
    ) -> Result<Vec<(Uuid, String)>>;
}

#[async_trait]
impl<T: TreeStore + ?Sized> TreeStore for std::sync::Arc<T> {
    async fn load_tree(&self, vocabulary_id: Uuid) -> Result<Vec<EntryNode>> {
        (**self).load_tree(vocabulary_id).await
    }

    async fn apply_batch(&self, vocabulary_id: Uuid, updates: &Ledger) -> Result<u64> {
        (**self).apply_batch(vocabulary_id, updates).await
    }
}
