//! # taxon-core
//!
//! Core types, traits, and algorithms for taxon vocabularies.
//!
//! This crate provides the data model for hierarchical vocabularies, the
//! parent-aware slug generator, the storage traits implemented by backends,
//! and the [`TreeSession`] engine that turns drag-and-drop moves into one
//! consistent, atomic batch of updates.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod session;
pub mod slug;
pub mod traits;
pub mod tree;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use memory::MemoryTreeStore;
pub use models::*;
pub use session::TreeSession;
pub use traits::*;
pub use uuid_utils::new_v7;
