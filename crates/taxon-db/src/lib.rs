//! # taxon-db
//!
//! PostgreSQL database layer for taxon vocabularies.
//!
//! This crate provides:
//! - Connection pool management
//! - Vocabulary and entry repositories
//! - A [`TreeStore`] that loads a vocabulary tree in one query and applies
//!   drag-and-drop batches in one transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use taxon_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/taxon").await?;
//!
//!     let mut session = db.tree_session();
//!     session.load(vocabulary_id).await?;
//!     session.record_move(item_id, None, 0, &[item_id, other_id]);
//!     println!("{}", session.save().await?.notice());
//!     Ok(())
//! }
//! ```

pub mod entries;
pub mod pool;
pub mod vocabularies;

// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use taxon_core::*;

pub use entries::PgEntryRepository;
pub use pool::{
    create_pool, create_pool_with_config, create_pool_with_connect_options, log_pool_metrics,
    PoolConfig,
};
pub use vocabularies::PgVocabularyRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Vocabulary repository.
    pub vocabularies: Arc<PgVocabularyRepository>,
    /// Entry repository, also the tree store for sessions.
    pub entries: Arc<PgEntryRepository>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            vocabularies: Arc::new(PgVocabularyRepository::new(pool.clone())),
            entries: Arc::new(PgEntryRepository::new(pool.clone())),
            pool,
        }
    }

    /// Connect to database with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// A tree session over this database's entries.
    pub fn tree_session(&self) -> TreeSession<Arc<PgEntryRepository>> {
        TreeSession::new(Arc::clone(&self.entries))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
