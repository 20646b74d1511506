//! Vocabulary repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use taxon_core::{new_v7, Error, Result, Vocabulary, VocabularyRepository};

/// PostgreSQL implementation of VocabularyRepository.
pub struct PgVocabularyRepository {
    pool: Pool<Postgres>,
}

impl PgVocabularyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn vocabulary_from_row(row: PgRow) -> Vocabulary {
    Vocabulary {
        id: row.get("id"),
        name: row.get("name"),
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Vocabulary name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

#[async_trait]
impl VocabularyRepository for PgVocabularyRepository {
    async fn create(&self, name: &str) -> Result<Vocabulary> {
        let name = validate_name(name)?;
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO vocabulary (id, name, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $3)
             RETURNING id, name, created_at_utc, updated_at_utc",
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "vocabularies",
            op = "create",
            vocabulary_id = %id,
            "Created vocabulary"
        );

        Ok(vocabulary_from_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vocabulary>> {
        let row = sqlx::query(
            "SELECT id, name, created_at_utc, updated_at_utc FROM vocabulary WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(vocabulary_from_row))
    }

    async fn list(&self) -> Result<Vec<Vocabulary>> {
        let rows = sqlx::query(
            "SELECT id, name, created_at_utc, updated_at_utc FROM vocabulary ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(vocabulary_from_row).collect())
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Vocabulary> {
        let name = validate_name(name)?;

        // Entry slugs keep the name they were derived under.
        let row = sqlx::query(
            "UPDATE vocabulary SET name = $2, updated_at_utc = $3
             WHERE id = $1
             RETURNING id, name, created_at_utc, updated_at_utc",
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(vocabulary_from_row)
            .ok_or(Error::VocabularyNotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM vocabulary WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::VocabularyNotFound(id));
        }

        info!(
            subsystem = "database",
            component = "vocabularies",
            op = "delete",
            vocabulary_id = %id,
            "Deleted vocabulary and its entries"
        );
        Ok(())
    }
}
