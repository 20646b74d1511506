//! Centralized default constants for taxon.
//!
//! Shared default values live here so crates do not define their own magic
//! strings and numbers.

// =============================================================================
// SLUGS
// =============================================================================

/// Vocabulary token used when the vocabulary name is missing or normalizes
/// to nothing.
pub const DEFAULT_VOCAB_SLUG: &str = "DEFAULT_VOCAB";

/// Separator joining slug tokens.
pub const SLUG_SEPARATOR: char = '_';

// =============================================================================
// TREE DISPLAY
// =============================================================================

/// Prefix repeated once per depth level when rendering labels as a flat list.
pub const DEPTH_INDENT: &str = "— ";

/// Placeholder shown for an entry without any label.
pub const MISSING_LABEL: &str = "[no label]";

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Informational notice for a save with an empty ledger.
pub const NOTICE_NO_CHANGES: &str = "No changes to save";

/// Success notice for a committed save.
pub const NOTICE_SAVED: &str = "Order saved successfully";

/// Failure notice prefix for a save that was rejected or rolled back.
pub const NOTICE_SAVE_FAILED: &str = "Save failed";
