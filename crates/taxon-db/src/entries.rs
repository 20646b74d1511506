//! Vocabulary entry repository and tree store.
//!
//! `PgEntryRepository` serves both the admin-form lifecycle
//! ([`EntryRepository`]) and drag-and-drop persistence ([`TreeStore`]).
//! Same-vocabulary parents are enforced by a composite foreign key, so a
//! batch that points an entry at a foreign parent fails and rolls back.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tracing::{debug, info, trace};
use uuid::Uuid;

use taxon_core::{
    new_v7, slug, tree, CreateEntryRequest, EntryLabels, EntryNode, EntryRepository, Error,
    Ledger, Result, TreeStore, UpdateEntryRequest, VocabularyEntry,
};

const ENTRY_COLUMNS: &str = "id, vocabulary_id, parent_id, entry_value, entry_labels, rank, \
                             created_at_utc, updated_at_utc";

/// PostgreSQL implementation of EntryRepository and TreeStore.
pub struct PgEntryRepository {
    pool: Pool<Postgres>,
}

impl PgEntryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &PgRow) -> Result<VocabularyEntry> {
    let id: Uuid = row.get("id");
    let rank: i32 = row.get("rank");
    let Json(entry_labels): Json<EntryLabels> = row.get("entry_labels");

    Ok(VocabularyEntry {
        id,
        vocabulary_id: row.get("vocabulary_id"),
        parent_id: row.get("parent_id"),
        entry_value: row.get("entry_value"),
        entry_labels,
        rank: u32::try_from(rank)
            .map_err(|_| Error::Internal(format!("Entry {} has negative rank {}", id, rank)))?,
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    })
}

fn rank_to_db(rank: u32) -> Result<i32> {
    i32::try_from(rank).map_err(|_| Error::InvalidInput(format!("Rank {} is out of range", rank)))
}

fn validate_labels(labels: &EntryLabels) -> Result<()> {
    if labels.is_empty() {
        return Err(Error::InvalidInput(
            "An entry needs at least one label".to_string(),
        ));
    }
    if labels.keys().any(|locale| locale.trim().is_empty()) {
        return Err(Error::InvalidInput(
            "Label locale codes must not be empty".to_string(),
        ));
    }
    Ok(())
}

async fn fetch_entry(
    conn: &mut PgConnection,
    id: Uuid,
    lock: bool,
) -> Result<Option<VocabularyEntry>> {
    let sql = format!(
        "SELECT {} FROM vocabulary_entry WHERE id = $1{}",
        ENTRY_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;

    row.as_ref().map(entry_from_row).transpose()
}

async fn vocabulary_name(conn: &mut PgConnection, vocabulary_id: Uuid) -> Result<String> {
    let row = sqlx::query("SELECT name FROM vocabulary WHERE id = $1")
        .bind(vocabulary_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;

    row.map(|r| r.get::<String, _>("name"))
        .ok_or(Error::VocabularyNotFound(vocabulary_id))
}

/// Load `parent_id` and check it belongs to `vocabulary_id`.
async fn resolve_parent(
    conn: &mut PgConnection,
    vocabulary_id: Uuid,
    parent_id: Uuid,
) -> Result<VocabularyEntry> {
    let parent = fetch_entry(conn, parent_id, false)
        .await?
        .ok_or(Error::EntryNotFound(parent_id))?;

    if parent.vocabulary_id != vocabulary_id {
        return Err(Error::InvalidInput(format!(
            "Parent {} belongs to another vocabulary",
            parent_id
        )));
    }
    Ok(parent)
}

/// Rank one past the last sibling under `parent_id`.
async fn next_rank(
    conn: &mut PgConnection,
    vocabulary_id: Uuid,
    parent_id: Option<Uuid>,
) -> Result<u32> {
    let next: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(rank) + 1, 0) FROM vocabulary_entry
         WHERE vocabulary_id = $1 AND parent_id IS NOT DISTINCT FROM $2",
    )
    .bind(vocabulary_id)
    .bind(parent_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)?;

    u32::try_from(next).map_err(|_| Error::Internal(format!("Invalid next rank {}", next)))
}

/// Whether `candidate` is in the subtree below `ancestor`.
async fn is_descendant(conn: &mut PgConnection, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        WITH RECURSIVE subtree AS (
            SELECT id FROM vocabulary_entry WHERE parent_id = $1
            UNION
            SELECT e.id FROM vocabulary_entry e JOIN subtree s ON e.parent_id = s.id
        )
        SELECT EXISTS (SELECT 1 FROM subtree WHERE id = $2)
        "#,
    )
    .bind(ancestor)
    .bind(candidate)
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)
}

#[async_trait]
impl EntryRepository for PgEntryRepository {
    async fn create(&self, req: CreateEntryRequest) -> Result<VocabularyEntry> {
        validate_labels(&req.entry_labels)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let name = vocabulary_name(&mut tx, req.vocabulary_id).await?;
        let parent_slug = match req.parent_id {
            Some(parent_id) => Some(
                resolve_parent(&mut tx, req.vocabulary_id, parent_id)
                    .await?
                    .entry_value,
            ),
            None => None,
        };
        let rank = match req.rank {
            Some(rank) => rank,
            None => next_rank(&mut tx, req.vocabulary_id, req.parent_id).await?,
        };
        let entry_value = slug::derive(Some(&name), parent_slug.as_deref(), &req.entry_labels);
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO vocabulary_entry
                 (id, vocabulary_id, parent_id, entry_value, entry_labels, rank,
                  created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .bind(req.vocabulary_id)
        .bind(req.parent_id)
        .bind(&entry_value)
        .bind(Json(&req.entry_labels))
        .bind(rank_to_db(rank)?)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "entries",
            op = "create",
            vocabulary_id = %req.vocabulary_id,
            entry_id = %id,
            entry_value = %entry_value,
            "Created entry"
        );

        entry_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<VocabularyEntry>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        fetch_entry(&mut conn, id, false).await
    }

    async fn list_for_vocabulary(&self, vocabulary_id: Uuid) -> Result<Vec<VocabularyEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vocabulary_entry
             WHERE vocabulary_id = $1
             ORDER BY parent_id NULLS FIRST, rank, created_at_utc, id",
            ENTRY_COLUMNS
        ))
        .bind(vocabulary_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn update(&self, id: Uuid, req: UpdateEntryRequest) -> Result<VocabularyEntry> {
        if let Some(labels) = &req.entry_labels {
            validate_labels(labels)?;
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let current = fetch_entry(&mut tx, id, true)
            .await?
            .ok_or(Error::EntryNotFound(id))?;

        let parent_id = req.parent_id.unwrap_or(current.parent_id);
        let parent_changed = parent_id != current.parent_id;

        if let Some(new_parent) = parent_id.filter(|_| parent_changed) {
            if new_parent == id || is_descendant(&mut tx, id, new_parent).await? {
                return Err(Error::CycleDetected(id));
            }
        }

        let entry_value = if req.requires_reslug() {
            let name = vocabulary_name(&mut tx, current.vocabulary_id).await?;
            let parent_slug = match parent_id {
                Some(parent_id) => Some(
                    resolve_parent(&mut tx, current.vocabulary_id, parent_id)
                        .await?
                        .entry_value,
                ),
                None => None,
            };
            let labels = req.entry_labels.as_ref().unwrap_or(&current.entry_labels);
            slug::derive(Some(&name), parent_slug.as_deref(), labels)
        } else {
            current.entry_value.clone()
        };

        let rank = match req.rank {
            Some(rank) => rank,
            None if parent_changed => next_rank(&mut tx, current.vocabulary_id, parent_id).await?,
            None => current.rank,
        };
        let labels = req.entry_labels.unwrap_or(current.entry_labels);

        let row = sqlx::query(&format!(
            "UPDATE vocabulary_entry
             SET entry_labels = $2, parent_id = $3, entry_value = $4, rank = $5,
                 updated_at_utc = $6
             WHERE id = $1
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .bind(Json(&labels))
        .bind(parent_id)
        .bind(&entry_value)
        .bind(rank_to_db(rank)?)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "entries",
            op = "update",
            entry_id = %id,
            parent_id = ?parent_id,
            entry_value = %entry_value,
            "Updated entry"
        );

        entry_from_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM vocabulary_entry WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::EntryNotFound(id));
        }

        info!(
            subsystem = "database",
            component = "entries",
            op = "delete",
            entry_id = %id,
            "Deleted entry"
        );
        Ok(())
    }

    async fn parent_options(
        &self,
        vocabulary_id: Uuid,
        locale: &str,
        exclude: Option<Uuid>,
    ) -> Result<Vec<(Uuid, String)>> {
        let forest = self.load_tree(vocabulary_id).await?;
        Ok(tree::parent_options(&forest, locale, exclude))
    }
}

#[async_trait]
impl TreeStore for PgEntryRepository {
    async fn load_tree(&self, vocabulary_id: Uuid) -> Result<Vec<EntryNode>> {
        let start = Instant::now();
        let entries = self.list_for_vocabulary(vocabulary_id).await?;
        let entry_count = entries.len();
        let forest = tree::build_forest(entries);

        debug!(
            subsystem = "database",
            component = "entries",
            op = "load_tree",
            vocabulary_id = %vocabulary_id,
            entry_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded entry tree"
        );
        Ok(forest)
    }

    async fn apply_batch(&self, vocabulary_id: Uuid, updates: &Ledger) -> Result<u64> {
        let start = Instant::now();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut affected = 0u64;

        // Ledger iteration is ordered by id, so concurrent batches lock rows
        // in the same order. Rows outside `vocabulary_id` match nothing.
        for (id, update) in updates {
            let query = match (update.parent_id, update.rank) {
                (Some(parent_id), Some(rank)) => sqlx::query(
                    "UPDATE vocabulary_entry SET parent_id = $3, rank = $4, updated_at_utc = $5
                     WHERE id = $1 AND vocabulary_id = $2",
                )
                .bind(*id)
                .bind(vocabulary_id)
                .bind(parent_id)
                .bind(rank_to_db(rank)?)
                .bind(now),
                (Some(parent_id), None) => sqlx::query(
                    "UPDATE vocabulary_entry SET parent_id = $3, updated_at_utc = $4
                     WHERE id = $1 AND vocabulary_id = $2",
                )
                .bind(*id)
                .bind(vocabulary_id)
                .bind(parent_id)
                .bind(now),
                (None, Some(rank)) => sqlx::query(
                    "UPDATE vocabulary_entry SET rank = $3, updated_at_utc = $4
                     WHERE id = $1 AND vocabulary_id = $2",
                )
                .bind(*id)
                .bind(vocabulary_id)
                .bind(rank_to_db(rank)?)
                .bind(now),
                (None, None) => continue,
            };

            let rows = query
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected();

            trace!(
                subsystem = "database",
                component = "entries",
                op = "apply_batch",
                entry_id = %id,
                parent_id = ?update.parent_id,
                rank = ?update.rank,
                rows,
                "Applied entry update"
            );
            affected += rows;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "entries",
            op = "apply_batch",
            vocabulary_id = %vocabulary_id,
            batch_size = updates.len(),
            affected_count = affected,
            duration_ms = start.elapsed().as_millis() as u64,
            "Committed entry batch"
        );
        Ok(affected)
    }
}
