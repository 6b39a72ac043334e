use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;

use engram_types::Conversation;

use crate::records::{
    BugRow, DecisionRow, FileActivityRow, PhraseHit, ProjectStatsRow, QualityReport, QualityRow,
    RawMessageHit, SemanticHit, SnapshotListing, StoredSnapshot, SystemStats, TimelineRow,
};
use crate::{Error, Result, Store};

/// Characters of context on each side of a substring hit.
const SNIPPET_CONTEXT: usize = 80;

const LISTING_COLUMNS: &str = "id, project_path, session_id, captured_at, trigger_event, \
     message_count, left(coalesce(summary, ''), 160) AS summary_excerpt, tags";

pub(crate) fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, 100)
}

/// Escape ILIKE metacharacters and wrap in wildcards.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn listing_from_row(row: &PgRow) -> Result<SnapshotListing> {
    Ok(SnapshotListing {
        id: row.try_get("id")?,
        project_path: row.try_get("project_path")?,
        session_id: row.try_get("session_id")?,
        captured_at: row.try_get("captured_at")?,
        trigger_event: row.try_get("trigger_event")?,
        message_count: row.try_get("message_count")?,
        summary_excerpt: row.try_get("summary_excerpt")?,
        tags: row.try_get("tags")?,
    })
}

fn snap_back(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn snap_forward(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Extract a `±SNIPPET_CONTEXT`-character window around the first
/// case-insensitive occurrence of `query` in `content`.
///
/// Offsets come from the lowercased copy; they line up with the
/// original for ASCII and get snapped to char boundaries otherwise.
fn context_snippet(content: &str, query: &str) -> Option<String> {
    let lowered = content.to_lowercase();
    let needle = query.to_lowercase();
    let pos = lowered.find(&needle)?;

    let pos = snap_back(content, pos.min(content.len()));
    let start = snap_back(content, pos.saturating_sub(SNIPPET_CONTEXT));
    let end = snap_forward(
        content,
        (pos + needle.len() + SNIPPET_CONTEXT).min(content.len()),
    );

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&content[start..end]);
    if end < content.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

/// Keyword bucket for a fixed-bug line.
pub(crate) fn classify_bug(bug: &str) -> &'static str {
    let b = bug.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| b.contains(k));

    if has(&["sql", "database", "migration", "query"]) {
        "database"
    } else if has(&["auth", "security", "injection", "token", "permission"]) {
        "security"
    } else if has(&["race", "deadlock", "concurren", "lock"]) {
        "concurrency"
    } else if has(&["timeout", "slow", "performance", "memory", "leak"]) {
        "performance"
    } else if has(&["ui", "css", "layout", "render"]) {
        "frontend"
    } else {
        "general"
    }
}

/// Coarse file class from the extension.
pub(crate) fn classify_file(file: &str) -> &'static str {
    let ext = file.rsplit('.').next().unwrap_or("");
    match ext {
        "rs" | "go" | "py" | "js" | "jsx" | "ts" | "tsx" | "java" | "rb" | "c" | "h" | "cpp"
        | "hpp" | "cs" | "php" | "swift" | "kt" => "source",
        "sql" => "sql",
        "json" | "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf" | "lock" => "config",
        "md" | "rst" | "txt" => "docs",
        "sh" | "bash" | "zsh" => "shell",
        "html" | "css" | "scss" | "vue" | "svelte" => "frontend",
        _ => "other",
    }
}

impl Store {
    /// Recent snapshots, newest first, optionally scoped to a project.
    pub async fn list_recent(
        &self,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SnapshotListing>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM context_snapshots
            WHERE ($1::text IS NULL OR project_path = $1)
            ORDER BY captured_at DESC
            LIMIT $2
            "#
        ))
        .bind(project_path)
        .bind(clamp_limit(limit, 10))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(listing_from_row).collect()
    }

    /// Full snapshot by id.
    pub async fn get_snapshot(&self, id: i64) -> Result<StoredSnapshot> {
        let row = sqlx::query(
            r#"
            SELECT id, project_path, session_id, transcript_path, captured_at,
                   trigger_event, message_count, raw_context, summary, embedding,
                   tags, mentioned_files, key_decisions, bugs_fixed,
                   git_commit_hash, git_branch, size_bytes
            FROM context_snapshots
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(Error::NotFound(id))?;

        let raw: serde_json::Value = row.try_get("raw_context")?;
        let raw_context: Conversation = serde_json::from_value(raw)
            .map_err(|e| Error::Fatal(format!("snapshot {id} raw_context malformed: {e}")))?;
        let embedding: Option<Vector> = row.try_get("embedding")?;

        Ok(StoredSnapshot {
            id: row.try_get("id")?,
            project_path: row.try_get("project_path")?,
            session_id: row.try_get("session_id")?,
            transcript_path: row.try_get("transcript_path")?,
            captured_at: row.try_get("captured_at")?,
            trigger_event: row.try_get("trigger_event")?,
            message_count: row.try_get("message_count")?,
            raw_context,
            summary: row.try_get("summary")?,
            embedding: embedding.map(|v| v.to_vec()),
            tags: row.try_get("tags")?,
            mentioned_files: row.try_get("mentioned_files")?,
            key_decisions: row.try_get("key_decisions")?,
            bugs_fixed: row.try_get("bugs_fixed")?,
            git_commit_hash: row.try_get("git_commit_hash")?,
            git_branch: row.try_get("git_branch")?,
            size_bytes: row.try_get("size_bytes")?,
        })
    }

    /// K nearest snapshots by cosine distance, ascending.
    pub async fn semantic_search(
        &self,
        query_vector: &[f32],
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SemanticHit>> {
        let vector = Vector::from(query_vector.to_vec());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LISTING_COLUMNS}, (embedding <=> $1) AS distance
            FROM context_snapshots
            WHERE embedding IS NOT NULL
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY embedding <=> $1
            LIMIT $3
            "#
        ))
        .bind(&vector)
        .bind(project_path)
        .bind(clamp_limit(limit, 5))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SemanticHit {
                    snapshot: listing_from_row(row)?,
                    distance: row.try_get("distance")?,
                })
            })
            .collect()
    }

    /// Lexical fallback over summaries, used when no query vector is
    /// available.
    pub async fn lexical_search(
        &self,
        query: &str,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SemanticHit>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM context_snapshots
            WHERE summary ILIKE $1
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY captured_at DESC
            LIMIT $3
            "#
        ))
        .bind(like_pattern(query))
        .bind(project_path)
        .bind(clamp_limit(limit, 5))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SemanticHit {
                    snapshot: listing_from_row(row)?,
                    distance: None,
                })
            })
            .collect()
    }

    /// Substring scan over the raw conversation documents.
    ///
    /// The database narrows candidates; snippet extraction walks the
    /// matching messages.
    pub async fn search_raw_messages(
        &self,
        query: &str,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<RawMessageHit>> {
        let limit = clamp_limit(limit, 10);
        let rows = sqlx::query(
            r#"
            SELECT id, project_path, captured_at, raw_context
            FROM context_snapshots
            WHERE raw_context::text ILIKE $1
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY captured_at DESC
            LIMIT $3
            "#,
        )
        .bind(like_pattern(query))
        .bind(project_path)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut hits = Vec::new();
        for row in &rows {
            let snapshot_id: i64 = row.try_get("id")?;
            let project: String = row.try_get("project_path")?;
            let captured_at: DateTime<Utc> = row.try_get("captured_at")?;
            let raw: serde_json::Value = row.try_get("raw_context")?;
            let Ok(conversation) = serde_json::from_value::<Conversation>(raw) else {
                continue;
            };

            for message in &conversation.messages {
                if let Some(snippet) = context_snippet(&message.content, query) {
                    hits.push(RawMessageHit {
                        snapshot_id,
                        project_path: project.clone(),
                        captured_at,
                        role: message.role.as_str().to_string(),
                        snippet,
                    });
                    if hits.len() as i64 >= limit {
                        return Ok(hits);
                    }
                }
            }
        }
        Ok(hits)
    }

    /// Case-insensitive literal match over assistant messages.
    pub async fn search_exact_phrase(
        &self,
        phrase: &str,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<PhraseHit>> {
        let limit = clamp_limit(limit, 10);
        let rows = sqlx::query(
            r#"
            SELECT id, project_path, captured_at, raw_context
            FROM context_snapshots
            WHERE raw_context::text ILIKE $1
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY captured_at DESC
            LIMIT $3
            "#,
        )
        .bind(like_pattern(phrase))
        .bind(project_path)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut hits = Vec::new();
        for row in &rows {
            let snapshot_id: i64 = row.try_get("id")?;
            let project: String = row.try_get("project_path")?;
            let captured_at: DateTime<Utc> = row.try_get("captured_at")?;
            let raw: serde_json::Value = row.try_get("raw_context")?;
            let Ok(conversation) = serde_json::from_value::<Conversation>(raw) else {
                continue;
            };

            for message in &conversation.messages {
                if message.role != engram_types::Role::Assistant {
                    continue;
                }
                if let Some(excerpt) = context_snippet(&message.content, phrase) {
                    hits.push(PhraseHit {
                        snapshot_id,
                        project_path: project.clone(),
                        captured_at,
                        excerpt,
                    });
                    if hits.len() as i64 >= limit {
                        return Ok(hits);
                    }
                }
            }
        }
        Ok(hits)
    }

    /// Flattened decision feed, optionally filtered by keyword.
    pub async fn search_decisions(
        &self,
        keyword: Option<&str>,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<DecisionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, project_path, captured_at, decision
            FROM decision_log
            WHERE ($1::text IS NULL OR decision ILIKE $1)
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY captured_at DESC
            LIMIT $3
            "#,
        )
        .bind(keyword.map(like_pattern))
        .bind(project_path)
        .bind(clamp_limit(limit, 20))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DecisionRow {
                    snapshot_id: row.try_get("snapshot_id")?,
                    project_path: row.try_get("project_path")?,
                    captured_at: row.try_get("captured_at")?,
                    decision: row.try_get("decision")?,
                })
            })
            .collect()
    }

    /// Flattened bug feed with keyword classification.
    pub async fn analyze_bugs(
        &self,
        category: Option<&str>,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<BugRow>> {
        // Category is derived in code, so over-fetch before filtering.
        let limit = clamp_limit(limit, 20);
        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, project_path, captured_at, bug
            FROM bug_ledger
            WHERE ($1::text IS NULL OR project_path = $1)
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(project_path)
        .bind(limit * 5)
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::new();
        for row in &rows {
            let bug: String = row.try_get("bug")?;
            let bucket = classify_bug(&bug);
            if category.is_some_and(|c| !c.eq_ignore_ascii_case(bucket)) {
                continue;
            }
            out.push(BugRow {
                snapshot_id: row.try_get("snapshot_id")?,
                project_path: row.try_get("project_path")?,
                captured_at: row.try_get("captured_at")?,
                bug,
                category: bucket.to_string(),
            });
            if out.len() as i64 >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Most-mentioned files with type classification.
    pub async fn file_activity(
        &self,
        file_type: Option<&str>,
        min_mentions: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<FileActivityRow>> {
        let limit = clamp_limit(limit, 20);
        let rows = sqlx::query(
            r#"
            SELECT file, mentions, project_count, last_seen
            FROM file_heatmap
            WHERE mentions >= $1
            ORDER BY mentions DESC, file
            LIMIT $2
            "#,
        )
        .bind(min_mentions.unwrap_or(1).max(1))
        .bind(limit * 5)
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::new();
        for row in &rows {
            let file: String = row.try_get("file")?;
            let class = classify_file(&file);
            if file_type.is_some_and(|t| !t.eq_ignore_ascii_case(class)) {
                continue;
            }
            out.push(FileActivityRow {
                file,
                file_type: class.to_string(),
                mentions: row.try_get("mentions")?,
                project_count: row.try_get("project_count")?,
                last_seen: row.try_get("last_seen")?,
            });
            if out.len() as i64 >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Per-project dashboard aggregates.
    pub async fn project_stats(
        &self,
        project_path: Option<&str>,
    ) -> Result<Vec<ProjectStatsRow>> {
        let rows = sqlx::query(
            r#"
            SELECT project_path, snapshot_count, session_count, total_messages,
                   total_bytes, first_capture, last_capture
            FROM project_stats
            WHERE ($1::text IS NULL OR project_path = $1)
            ORDER BY last_capture DESC
            "#,
        )
        .bind(project_path)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ProjectStatsRow {
                    project_path: row.try_get("project_path")?,
                    snapshot_count: row.try_get("snapshot_count")?,
                    session_count: row.try_get("session_count")?,
                    total_messages: row.try_get("total_messages")?,
                    total_bytes: row.try_get("total_bytes")?,
                    first_capture: row.try_get("first_capture")?,
                    last_capture: row.try_get("last_capture")?,
                })
            })
            .collect()
    }

    /// Chronologically descending capture timeline.
    pub async fn timeline(
        &self,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<TimelineRow>> {
        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, project_path, session_id, captured_at,
                   trigger_event, trigger_class, message_count, summary_excerpt
            FROM capture_timeline
            WHERE ($1::text IS NULL OR project_path = $1)
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(project_path)
        .bind(clamp_limit(limit, 20))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TimelineRow {
                    snapshot_id: row.try_get("snapshot_id")?,
                    project_path: row.try_get("project_path")?,
                    session_id: row.try_get("session_id")?,
                    captured_at: row.try_get("captured_at")?,
                    trigger_event: row.try_get("trigger_event")?,
                    trigger_class: row.try_get("trigger_class")?,
                    message_count: row.try_get("message_count")?,
                    summary_excerpt: row.try_get("summary_excerpt")?,
                })
            })
            .collect()
    }

    /// Quality rows above a floor plus corpus-wide buckets.
    pub async fn quality_report(
        &self,
        min_score: Option<i32>,
        project_path: Option<&str>,
        limit: Option<i64>,
    ) -> Result<QualityReport> {
        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, project_path, captured_at, score
            FROM snapshot_quality
            WHERE score >= $1
              AND ($2::text IS NULL OR project_path = $2)
            ORDER BY score DESC, captured_at DESC
            LIMIT $3
            "#,
        )
        .bind(min_score.unwrap_or(0))
        .bind(project_path)
        .bind(clamp_limit(limit, 20))
        .fetch_all(self.pool())
        .await?;

        let quality_rows = rows
            .iter()
            .map(|row| {
                Ok(QualityRow {
                    snapshot_id: row.try_get("snapshot_id")?,
                    project_path: row.try_get("project_path")?,
                    captured_at: row.try_get("captured_at")?,
                    score: row.try_get("score")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (high, medium, low): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT count(*) FILTER (WHERE score >= 8),
                   count(*) FILTER (WHERE score BETWEEN 5 AND 7),
                   count(*) FILTER (WHERE score < 5)
            FROM snapshot_quality
            WHERE ($1::text IS NULL OR project_path = $1)
            "#,
        )
        .bind(project_path)
        .fetch_one(self.pool())
        .await?;

        Ok(QualityReport {
            rows: quality_rows,
            high,
            medium,
            low,
        })
    }

    /// Corpus-wide counters for the status endpoint.
    pub async fn system_stats(&self) -> Result<SystemStats> {
        let (snapshot_count, project_count, total_bytes): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT count(*),
                   count(DISTINCT project_path),
                   coalesce(sum(size_bytes), 0)::bigint
            FROM context_snapshots
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        let (agent_work_count,): (i64,) = sqlx::query_as("SELECT count(*) FROM agent_work")
            .fetch_one(self.pool())
            .await?;
        let (agent_definition_count,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM agent_definitions")
                .fetch_one(self.pool())
                .await?;

        Ok(SystemStats {
            snapshot_count,
            project_count,
            agent_work_count,
            agent_definition_count,
            total_bytes,
        })
    }
}
