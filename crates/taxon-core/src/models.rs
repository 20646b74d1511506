//! Core data models for taxon vocabularies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::defaults::{MISSING_LABEL, NOTICE_NO_CHANGES, NOTICE_SAVED};

/// Locale code → label text.
///
/// Ordered by locale code, so the first entry is always the
/// lexicographically-first locale.
pub type EntryLabels = BTreeMap<String, String>;

/// Pending per-entry changes keyed by entry id.
pub type Ledger = BTreeMap<Uuid, EntryUpdate>;

// =============================================================================
// VOCABULARY TYPES
// =============================================================================

/// A named vocabulary owning a tree of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: Uuid,
    pub name: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

/// One node of a vocabulary's taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: Uuid,
    pub vocabulary_id: Uuid,
    /// Parent entry in the same vocabulary (None = root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Derived slug, uppercase and underscore-separated
    pub entry_value: String,
    pub entry_labels: EntryLabels,
    /// Zero-based position among siblings sharing `parent_id`
    pub rank: u32,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl VocabularyEntry {
    /// Label for `locale`, falling back to the first label by locale order.
    pub fn label(&self, locale: &str) -> &str {
        self.entry_labels
            .get(locale)
            .or_else(|| self.entry_labels.values().next())
            .map(String::as_str)
            .unwrap_or(MISSING_LABEL)
    }
}

/// An entry together with its ordered, owned children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryNode {
    #[serde(flatten)]
    pub entry: VocabularyEntry,
    #[serde(default)]
    pub children: Vec<EntryNode>,
}

impl EntryNode {
    pub fn new(entry: VocabularyEntry) -> Self {
        Self {
            entry,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.entry.id
    }

    /// Number of nodes in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(EntryNode::count).sum::<usize>()
    }
}

// =============================================================================
// LEDGER TYPES
// =============================================================================

/// Partial update for one entry.
///
/// `parent_id`: `None` leaves the column untouched, `Some(None)` moves the
/// entry to the root, `Some(Some(id))` reparents it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_none() && self.rank.is_none()
    }

    /// Overlay `other` onto `self`; fields present in `other` win.
    pub fn merge(&mut self, other: EntryUpdate) {
        if other.parent_id.is_some() {
            self.parent_id = other.parent_id;
        }
        if other.rank.is_some() {
            self.rank = other.rank;
        }
    }
}

/// Distinguishes an explicit `null` from an absent field.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

/// Result of a successful `TreeSession::save`.
///
/// Failures are reported through the `Err` arm of the save call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The ledger was empty; nothing was written.
    NoChanges,
    /// The batch was committed.
    Saved { affected: u64 },
}

impl SaveOutcome {
    /// User-facing notification text.
    pub fn notice(&self) -> &'static str {
        match self {
            SaveOutcome::NoChanges => NOTICE_NO_CHANGES,
            SaveOutcome::Saved { .. } => NOTICE_SAVED,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Request for creating a vocabulary entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryRequest {
    pub vocabulary_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub entry_labels: EntryLabels,
    /// Explicit rank; appended after the last sibling when omitted
    #[serde(default)]
    pub rank: Option<u32>,
}

/// Request for editing a vocabulary entry through the admin form.
///
/// Changing labels or parent re-derives the entry's slug.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEntryRequest {
    #[serde(default)]
    pub entry_labels: Option<EntryLabels>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub rank: Option<u32>,
}

impl UpdateEntryRequest {
    /// Whether the edit touches fields the slug is derived from.
    pub fn requires_reslug(&self) -> bool {
        self.entry_labels.is_some() || self.parent_id.is_some()
    }
}
