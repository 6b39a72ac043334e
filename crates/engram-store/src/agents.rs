use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::warn;

use engram_types::{AgentWorkRecord, EMBEDDING_DIM};

use crate::reads::{clamp_limit, like_pattern};
use crate::records::{
    AgentPerformanceRow, AgentWorkListing, AgentWorkOutcome, PersistAction, ToolUsageRow,
    VersionComparisonRow,
};
use crate::{Error, Result, Store};

const WORK_COLUMNS: &str = "w.id, w.agent_id, d.agent_type, w.parent_session_id, \
     left(coalesce(w.task, ''), 160) AS task_excerpt, \
     left(coalesce(w.result_summary, ''), 160) AS result_excerpt, \
     w.started_at, \
     extract(epoch FROM (w.ended_at - w.started_at))::float8 AS duration_seconds";

fn work_from_row(row: &PgRow) -> Result<AgentWorkListing> {
    Ok(AgentWorkListing {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        agent_type: row.try_get("agent_type")?,
        parent_session_id: row.try_get("parent_session_id")?,
        task_excerpt: row.try_get("task_excerpt")?,
        result_excerpt: row.try_get("result_excerpt")?,
        started_at: row.try_get("started_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        distance: row.try_get("distance").ok(),
    })
}

impl Store {
    /// Persist one delegated-agent execution.
    ///
    /// The definition dedups on `(agent_type, config_hash)`; a new
    /// blueprint gets the next version for its type and points at the
    /// previous latest as its predecessor. The work row upserts on
    /// `(agent_id, parent_session_id)`.
    pub async fn record_agent_work(&self, record: &AgentWorkRecord) -> Result<AgentWorkOutcome> {
        match self.try_record_agent_work(record).await {
            Err(Error::Database(err)) if Error::is_unique_violation(&err) => {
                warn!(
                    agent_id = %record.agent_id,
                    parent_session_id = %record.parent_session_id,
                    "agent work insert lost a race, retrying"
                );
                self.try_record_agent_work(record).await
            }
            outcome => outcome,
        }
    }

    async fn try_record_agent_work(
        &self,
        record: &AgentWorkRecord,
    ) -> Result<AgentWorkOutcome> {
        let embedding = match record.embedding.len() {
            0 => None,
            n if n == EMBEDDING_DIM => Some(Vector::from(record.embedding.clone())),
            n => {
                return Err(Error::Fatal(format!(
                    "agent work embedding has {n} components, expected {EMBEDDING_DIM}"
                )))
            }
        };

        let mut tx = self.pool().begin().await?;

        let config_hash = record.definition.config_hash();
        let mut tools = record.definition.tools.clone();
        tools.sort();

        let existing_def: Option<(i64, i32)> = sqlx::query_as(
            "SELECT id, version FROM agent_definitions WHERE agent_type = $1 AND config_hash = $2",
        )
        .bind(&record.definition.agent_type)
        .bind(&config_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let (definition_id, definition_version) = match existing_def {
            Some(found) => found,
            None => {
                sqlx::query_as(
                    r#"
                    INSERT INTO agent_definitions (
                        agent_type, display_name, system_prompt, config, tools,
                        model, version, parent_definition_id, description,
                        created_by, config_hash
                    )
                    SELECT $1, $2, $3, $4, $5, $6,
                           coalesce((SELECT max(version) FROM agent_definitions
                                     WHERE agent_type = $1), 0) + 1,
                           (SELECT id FROM agent_definitions
                            WHERE agent_type = $1
                            ORDER BY version DESC LIMIT 1),
                           $7, $8, $9
                    RETURNING id, version
                    "#,
                )
                .bind(&record.definition.agent_type)
                .bind(&record.definition.display_name)
                .bind(&record.definition.system_prompt)
                .bind(&record.definition.config)
                .bind(&tools)
                .bind(&record.definition.model)
                .bind(&record.definition.description)
                .bind(&record.definition.created_by)
                .bind(&config_hash)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let messages = serde_json::to_value(&record.messages)
            .map_err(|e| Error::Fatal(format!("agent messages not serializable: {e}")))?;
        let tool_calls = serde_json::to_value(&record.tool_calls)
            .map_err(|e| Error::Fatal(format!("tool histogram not serializable: {e}")))?;

        let existing_work: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM agent_work
            WHERE agent_id = $1 AND parent_session_id = $2
            FOR UPDATE
            "#,
        )
        .bind(&record.agent_id)
        .bind(&record.parent_session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, action) = match existing_work {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE agent_work SET
                        request_id = $2,
                        snapshot_id = $3,
                        definition_id = $4,
                        task = $5,
                        transcript_path = $6,
                        messages = $7,
                        tool_calls = $8,
                        files_examined = $9,
                        urls_fetched = $10,
                        result_summary = $11,
                        started_at = $12,
                        ended_at = $13,
                        embedding = $14
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&record.request_id)
                .bind(record.snapshot_id)
                .bind(definition_id)
                .bind(&record.task)
                .bind(&record.transcript_path)
                .bind(&messages)
                .bind(&tool_calls)
                .bind(&record.files_examined)
                .bind(&record.urls_fetched)
                .bind(&record.result_summary)
                .bind(record.started_at)
                .bind(record.ended_at)
                .bind(&embedding)
                .execute(&mut *tx)
                .await?;
                (id, PersistAction::Updated)
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO agent_work (
                        request_id, snapshot_id, parent_session_id, definition_id,
                        agent_id, task, transcript_path, messages, tool_calls,
                        files_examined, urls_fetched, result_summary,
                        started_at, ended_at, embedding
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    RETURNING id
                    "#,
                )
                .bind(&record.request_id)
                .bind(record.snapshot_id)
                .bind(&record.parent_session_id)
                .bind(definition_id)
                .bind(&record.agent_id)
                .bind(&record.task)
                .bind(&record.transcript_path)
                .bind(&messages)
                .bind(&tool_calls)
                .bind(&record.files_examined)
                .bind(&record.urls_fetched)
                .bind(&record.result_summary)
                .bind(record.started_at)
                .bind(record.ended_at)
                .bind(&embedding)
                .fetch_one(&mut *tx)
                .await?;
                (id, PersistAction::Inserted)
            }
        };

        let verified: Option<i64> = sqlx::query_scalar("SELECT id FROM agent_work WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if verified.is_none() {
            return Err(Error::Fatal(format!(
                "agent work {id} not readable after write"
            )));
        }

        tx.commit().await?;

        Ok(AgentWorkOutcome {
            id,
            definition_id,
            definition_version,
            action,
        })
    }

    /// K nearest agent-work rows by cosine distance.
    pub async fn semantic_agent_search(
        &self,
        query_vector: &[f32],
        limit: Option<i64>,
    ) -> Result<Vec<AgentWorkListing>> {
        let vector = Vector::from(query_vector.to_vec());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORK_COLUMNS}, (w.embedding <=> $1) AS distance
            FROM agent_work w
            JOIN agent_definitions d ON d.id = w.definition_id
            WHERE w.embedding IS NOT NULL
            ORDER BY w.embedding <=> $1
            LIMIT $2
            "#
        ))
        .bind(&vector)
        .bind(clamp_limit(limit, 5))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(work_from_row).collect()
    }

    /// Lexical fallback over task and result text.
    pub async fn lexical_agent_search(
        &self,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Vec<AgentWorkListing>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORK_COLUMNS}
            FROM agent_work w
            JOIN agent_definitions d ON d.id = w.definition_id
            WHERE w.task ILIKE $1 OR w.result_summary ILIKE $1
            ORDER BY w.started_at DESC NULLS LAST
            LIMIT $2
            "#
        ))
        .bind(like_pattern(query))
        .bind(clamp_limit(limit, 5))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(work_from_row).collect()
    }

    /// Latest agent executions, newest first.
    pub async fn recent_agent_work(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<AgentWorkListing>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORK_COLUMNS}
            FROM agent_work w
            JOIN agent_definitions d ON d.id = w.definition_id
            ORDER BY w.started_at DESC NULLS LAST
            LIMIT $1
            "#
        ))
        .bind(clamp_limit(limit, 10))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(work_from_row).collect()
    }

    /// Per-definition usage and outcome aggregates.
    pub async fn agent_performance(
        &self,
        agent_type: Option<&str>,
    ) -> Result<Vec<AgentPerformanceRow>> {
        let rows = sqlx::query(
            r#"
            SELECT definition_id, agent_type, display_name, version, times_used,
                   avg_duration_seconds::float8 AS avg_duration_seconds,
                   avg_message_count::float8 AS avg_message_count,
                   success_rate
            FROM agent_performance
            WHERE ($1::text IS NULL OR agent_type = $1)
            ORDER BY agent_type, version
            "#,
        )
        .bind(agent_type)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AgentPerformanceRow {
                    definition_id: row.try_get("definition_id")?,
                    agent_type: row.try_get("agent_type")?,
                    display_name: row.try_get("display_name")?,
                    version: row.try_get("version")?,
                    times_used: row.try_get("times_used")?,
                    avg_duration_seconds: row.try_get("avg_duration_seconds")?,
                    avg_message_count: row.try_get("avg_message_count")?,
                    success_rate: row.try_get("success_rate")?,
                })
            })
            .collect()
    }

    /// Per-type tool-call rollups, busiest tools first.
    pub async fn agent_tool_usage(
        &self,
        agent_type: Option<&str>,
    ) -> Result<Vec<ToolUsageRow>> {
        let rows = sqlx::query(
            r#"
            SELECT agent_type, tool, calls
            FROM agent_tool_usage
            WHERE ($1::text IS NULL OR agent_type = $1)
            ORDER BY calls DESC, agent_type, tool
            "#,
        )
        .bind(agent_type)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ToolUsageRow {
                    agent_type: row.try_get("agent_type")?,
                    tool: row.try_get("tool")?,
                    calls: row.try_get("calls")?,
                })
            })
            .collect()
    }

    /// Version-over-version average-duration comparison per agent type.
    pub async fn compare_agent_versions(
        &self,
        agent_type: Option<&str>,
    ) -> Result<Vec<VersionComparisonRow>> {
        let rows = sqlx::query(
            r#"
            SELECT agent_type, version,
                   avg_duration_seconds::float8 AS avg_duration_seconds,
                   lag(version) OVER w AS previous_version,
                   (lag(avg_duration_seconds) OVER w)::float8 AS previous_avg_duration_seconds
            FROM agent_performance
            WHERE ($1::text IS NULL OR agent_type = $1)
            WINDOW w AS (PARTITION BY agent_type ORDER BY version)
            ORDER BY agent_type, version
            "#,
        )
        .bind(agent_type)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let avg: Option<f64> = row.try_get("avg_duration_seconds")?;
                let prev_avg: Option<f64> = row.try_get("previous_avg_duration_seconds")?;
                let change = match (avg, prev_avg) {
                    (Some(current), Some(previous)) if previous > 0.0 => {
                        Some((current - previous) / previous * 100.0)
                    }
                    _ => None,
                };
                Ok(VersionComparisonRow {
                    agent_type: row.try_get("agent_type")?,
                    version: row.try_get("version")?,
                    avg_duration_seconds: avg,
                    previous_version: row.try_get("previous_version")?,
                    previous_avg_duration_seconds: prev_avg,
                    duration_change_pct: change,
                })
            })
            .collect()
    }
}
