use std::time::Duration;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

use engram_types::{PriorSession, SnapshotRecord, EMBEDDING_DIM};

use crate::records::{PersistAction, PersistOutcome};
use crate::schema::SCHEMA;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a caller may wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle over the relational + vector store.
///
/// Cloning is cheap; all clones share one bounded pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema (tables, indexes, views, pgvector extension).
    /// Idempotent; runs at startup.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Persist one processed snapshot.
    ///
    /// Matching on `session_id` or `transcript_path` updates the
    /// existing row; otherwise a new row is inserted. The whole
    /// operation is one transaction with the match row locked, so
    /// concurrent captures for the same session serialize and the last
    /// writer wins. An insert race (both writers saw no row) is
    /// retried once as an update.
    pub async fn persist(&self, record: &SnapshotRecord) -> Result<PersistOutcome> {
        if record.embedding.len() != EMBEDDING_DIM {
            return Err(Error::Fatal(format!(
                "embedding has {} components, expected {}",
                record.embedding.len(),
                EMBEDDING_DIM
            )));
        }

        match self.try_persist(record).await {
            Err(Error::Database(err)) if Error::is_unique_violation(&err) => {
                warn!(
                    project_path = %record.project_path,
                    session_id = record.session_id.as_deref().unwrap_or(""),
                    "snapshot insert lost a race, retrying as update"
                );
                self.try_persist(record).await.map_err(|retry_err| match retry_err {
                    Error::Database(err) if Error::is_unique_violation(&err) => Error::Conflict(
                        "upsert retry hit a second unique violation".to_string(),
                    ),
                    other => other,
                })
            }
            outcome => outcome,
        }
    }

    async fn try_persist(&self, record: &SnapshotRecord) -> Result<PersistOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = if record.session_id.is_some()
            || record.transcript_path.is_some()
        {
            sqlx::query_scalar(
                r#"
                SELECT id FROM context_snapshots
                WHERE ($1::text IS NOT NULL AND session_id = $1)
                   OR ($2::text IS NOT NULL AND transcript_path = $2)
                ORDER BY id
                LIMIT 1
                FOR UPDATE
                "#,
            )
            .bind(&record.session_id)
            .bind(&record.transcript_path)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        let raw_context = serde_json::to_value(&record.conversation)
            .map_err(|e| Error::Fatal(format!("raw conversation not serializable: {e}")))?;
        let embedding = Vector::from(record.embedding.clone());

        let (id, action) = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE context_snapshots SET
                        project_path = $2,
                        session_id = COALESCE($3, session_id),
                        transcript_path = COALESCE($4, transcript_path),
                        captured_at = now(),
                        trigger_event = $5,
                        message_count = $6,
                        raw_context = $7,
                        summary = $8,
                        embedding = $9,
                        tags = $10,
                        mentioned_files = $11,
                        key_decisions = $12,
                        bugs_fixed = $13,
                        git_commit_hash = $14,
                        git_branch = $15,
                        size_bytes = $16
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&record.project_path)
                .bind(&record.session_id)
                .bind(&record.transcript_path)
                .bind(&record.trigger)
                .bind(record.metadata.message_count as i32)
                .bind(&raw_context)
                .bind(&record.summary)
                .bind(&embedding)
                .bind(&record.metadata.tags)
                .bind(&record.metadata.files)
                .bind(&record.metadata.decisions)
                .bind(&record.metadata.bugs)
                .bind(&record.metadata.git_commit_hash)
                .bind(&record.metadata.git_branch)
                .bind(record.size_bytes as i32)
                .execute(&mut *tx)
                .await?;
                (id, PersistAction::Updated)
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO context_snapshots (
                        project_path, session_id, transcript_path, trigger_event,
                        message_count, raw_context, summary, embedding, tags,
                        mentioned_files, key_decisions, bugs_fixed,
                        git_commit_hash, git_branch, size_bytes
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    RETURNING id
                    "#,
                )
                .bind(&record.project_path)
                .bind(&record.session_id)
                .bind(&record.transcript_path)
                .bind(&record.trigger)
                .bind(record.metadata.message_count as i32)
                .bind(&raw_context)
                .bind(&record.summary)
                .bind(&embedding)
                .bind(&record.metadata.tags)
                .bind(&record.metadata.files)
                .bind(&record.metadata.decisions)
                .bind(&record.metadata.bugs)
                .bind(&record.metadata.git_commit_hash)
                .bind(&record.metadata.git_branch)
                .bind(record.size_bytes as i32)
                .fetch_one(&mut *tx)
                .await?;
                (id, PersistAction::Inserted)
            }
        };

        let captured_at = Self::verify_row(&mut tx, id).await?;
        tx.commit().await?;

        Ok(PersistOutcome {
            id,
            captured_at,
            action,
        })
    }

    /// Same-transaction read-back; a missing row means the write
    /// cannot be trusted.
    async fn verify_row(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<DateTime<Utc>> {
        let captured_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT captured_at FROM context_snapshots WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;

        captured_at.ok_or_else(|| {
            Error::Fatal(format!("snapshot {id} not readable after write"))
        })
    }

    /// Replace a snapshot's summary (and optionally its embedding) in
    /// place. Backs the on-demand re-summarization utility.
    pub async fn rewrite_summary(
        &self,
        id: i64,
        summary: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<()> {
        if let Some(ref vector) = embedding {
            if vector.len() != EMBEDDING_DIM {
                return Err(Error::Fatal(format!(
                    "embedding has {} components, expected {}",
                    vector.len(),
                    EMBEDDING_DIM
                )));
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE context_snapshots
            SET summary = $2,
                embedding = COALESCE($3, embedding)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(summary)
        .bind(embedding.map(Vector::from))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    /// Most recent snapshot for a project, reduced to what the
    /// summarization prompt needs.
    pub async fn latest_for_project(&self, project_path: &str) -> Result<Option<PriorSession>> {
        let row: Option<(i64, DateTime<Utc>, String, Vec<String>)> = sqlx::query_as(
            r#"
            SELECT id, captured_at, left(coalesce(summary, ''), 300), tags
            FROM context_snapshots
            WHERE project_path = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(project_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, captured_at, summary_excerpt, tags)| PriorSession {
            id,
            captured_at,
            summary_excerpt,
            tags,
        }))
    }
}
