use chrono::{DateTime, Utc};
use serde::Serialize;

use engram_types::Conversation;

/// How a persist call landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistAction {
    Inserted,
    Updated,
}

/// Result of one snapshot persist.
#[derive(Debug, Clone, Serialize)]
pub struct PersistOutcome {
    pub id: i64,
    pub captured_at: DateTime<Utc>,
    pub action: PersistAction,
}

/// Result of one agent-work persist, including how the definition
/// resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AgentWorkOutcome {
    pub id: i64,
    pub definition_id: i64,
    pub definition_version: i32,
    pub action: PersistAction,
}

/// Full snapshot as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSnapshot {
    pub id: i64,
    pub project_path: String,
    pub session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub trigger_event: String,
    pub message_count: i32,
    pub raw_context: Conversation,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub tags: Vec<String>,
    pub mentioned_files: Vec<String>,
    pub key_decisions: Vec<String>,
    pub bugs_fixed: Vec<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
    pub size_bytes: i32,
}

/// One row in a snapshot list (no conversation body).
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotListing {
    pub id: i64,
    pub project_path: String,
    pub session_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub trigger_event: String,
    pub message_count: i32,
    pub summary_excerpt: String,
    pub tags: Vec<String>,
}

/// Semantic search hit; `distance` is cosine distance, absent on the
/// lexical fallback path.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    #[serde(flatten)]
    pub snapshot: SnapshotListing,
    pub distance: Option<f64>,
}

/// Raw-message substring hit with surrounding context.
#[derive(Debug, Clone, Serialize)]
pub struct RawMessageHit {
    pub snapshot_id: i64,
    pub project_path: String,
    pub captured_at: DateTime<Utc>,
    pub role: String,
    pub snippet: String,
}

/// Exact-phrase hit over assistant messages.
#[derive(Debug, Clone, Serialize)]
pub struct PhraseHit {
    pub snapshot_id: i64,
    pub project_path: String,
    pub captured_at: DateTime<Utc>,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRow {
    pub snapshot_id: i64,
    pub project_path: String,
    pub captured_at: DateTime<Utc>,
    pub decision: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BugRow {
    pub snapshot_id: i64,
    pub project_path: String,
    pub captured_at: DateTime<Utc>,
    pub bug: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileActivityRow {
    pub file: String,
    pub file_type: String,
    pub mentions: i64,
    pub project_count: i64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatsRow {
    pub project_path: String,
    pub snapshot_count: i64,
    pub session_count: i64,
    pub total_messages: i64,
    pub total_bytes: i64,
    pub first_capture: DateTime<Utc>,
    pub last_capture: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineRow {
    pub snapshot_id: i64,
    pub project_path: String,
    pub session_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub trigger_event: String,
    pub trigger_class: String,
    pub message_count: i32,
    pub summary_excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityRow {
    pub snapshot_id: i64,
    pub project_path: String,
    pub captured_at: DateTime<Utc>,
    pub score: i32,
}

/// Quality rows plus the dashboard's fixed buckets.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub rows: Vec<QualityRow>,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformanceRow {
    pub definition_id: i64,
    pub agent_type: String,
    pub display_name: Option<String>,
    pub version: i32,
    pub times_used: i64,
    pub avg_duration_seconds: Option<f64>,
    pub avg_message_count: Option<f64>,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolUsageRow {
    pub agent_type: String,
    pub tool: String,
    pub calls: i64,
}

/// Version-over-version duration comparison for one agent type.
#[derive(Debug, Clone, Serialize)]
pub struct VersionComparisonRow {
    pub agent_type: String,
    pub version: i32,
    pub avg_duration_seconds: Option<f64>,
    pub previous_version: Option<i32>,
    pub previous_avg_duration_seconds: Option<f64>,
    /// Percentage change relative to the previous version; negative is
    /// faster.
    pub duration_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentWorkListing {
    pub id: i64,
    pub agent_id: String,
    pub agent_type: String,
    pub parent_session_id: String,
    pub task_excerpt: String,
    pub result_excerpt: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub distance: Option<f64>,
}

/// Corpus-wide counters for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub snapshot_count: i64,
    pub project_count: i64,
    pub agent_work_count: i64,
    pub agent_definition_count: i64,
    pub total_bytes: i64,
}
