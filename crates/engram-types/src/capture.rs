use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentDefinitionSpec;
use crate::conversation::Conversation;
use crate::metadata::SessionMetadata;

/// Capture request accepted by the ingress surface.
///
/// At least one of `conversation_data` or `transcript_path` must be
/// present for the request to be resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub project_path: String,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
}

impl CaptureRequest {
    /// Whether the conversation can be resolved from this request at all.
    pub fn has_source(&self) -> bool {
        self.conversation_data.is_some() || self.transcript_path.is_some()
    }
}

/// Delegated-agent capture request accepted by the ingress surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCaptureRequest {
    pub parent_session_id: String,
    pub agent_id: String,
    pub definition: AgentDefinitionSpec,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
    /// Tool-name histogram; derived from `messages` when absent.
    #[serde(default)]
    pub tool_calls: Option<std::collections::BTreeMap<String, i64>>,
    #[serde(default)]
    pub files_examined: Option<Vec<String>>,
    #[serde(default)]
    pub urls_fetched: Option<Vec<String>>,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Fully processed snapshot, ready for single-shot persistence.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub project_path: String,
    pub session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub trigger: String,
    pub conversation: Conversation,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub metadata: SessionMetadata,
    pub size_bytes: usize,
}

/// Most recent prior snapshot for a project, used as summarization context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorSession {
    pub id: i64,
    pub captured_at: DateTime<Utc>,
    pub summary_excerpt: String,
    pub tags: Vec<String>,
}
