//! Structured logging schema and field name constants for taxon.
//!
//! All crates use these names for structured `tracing` fields so that log
//! aggregation can query by the same keys across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Rejected or failed save, recoverable by the session |
//! | INFO  | Lifecycle events, completed saves, pool setup |
//! | DEBUG | Recorded moves, snapshot loads, renormalization decisions |
//! | TRACE | Per-row batch updates |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "core", "database", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "tree_session", "entries", "pool", "memory_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "load", "record_move", "save", "apply_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Vocabulary UUID being operated on.
pub const VOCABULARY_ID: &str = "vocabulary_id";

/// Entry UUID being operated on.
pub const ENTRY_ID: &str = "entry_id";

/// Parent entry UUID (absent for root moves).
pub const PARENT_ID: &str = "parent_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of ledger rows waiting to be saved.
pub const PENDING_COUNT: &str = "pending_count";

/// Number of rows in a submitted batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of rows actually changed by a batch.
pub const AFFECTED_COUNT: &str = "affected_count";

/// Number of entries in a loaded snapshot.
pub const ENTRY_COUNT: &str = "entry_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let fields = [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            VOCABULARY_ID,
            ENTRY_ID,
            PARENT_ID,
            DURATION_MS,
            PENDING_COUNT,
            BATCH_SIZE,
            AFFECTED_COUNT,
            ENTRY_COUNT,
            POOL_SIZE,
            POOL_IDLE,
            ERROR_MSG,
        ];
        let unique: HashSet<_> = fields.iter().collect();
        assert_eq!(unique.len(), fields.len());
        for field in fields {
            assert!(field
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
