use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::conversation::Conversation;

/// Reusable blueprint a delegated agent execution was run with.
///
/// Identical blueprints collapse to one stored definition, keyed by
/// `(agent_type, config_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinitionSpec {
    pub agent_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub tools: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl AgentDefinitionSpec {
    /// Content-addressed digest over the blueprint identity.
    ///
    /// Tool order and configuration key order do not affect the hash:
    /// tools are sorted and the configuration is rendered in canonical
    /// (recursively key-sorted) JSON before digesting. Sections are
    /// separated with a NUL byte so field boundaries cannot collide.
    pub fn config_hash(&self) -> String {
        let mut tools = self.tools.clone();
        tools.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.system_prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(&self.config).as_bytes());
        hasher.update([0u8]);
        hasher.update(tools.join("\n").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.model.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Render a JSON value with object keys sorted recursively.
///
/// Array order is preserved; only object key order is normalized.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Fully processed delegated-agent execution, ready for persistence.
#[derive(Debug, Clone)]
pub struct AgentWorkRecord {
    pub request_id: Option<String>,
    pub snapshot_id: Option<i64>,
    pub parent_session_id: String,
    pub agent_id: String,
    pub definition: AgentDefinitionSpec,
    pub task: Option<String>,
    pub transcript_path: Option<String>,
    pub messages: Conversation,
    pub tool_calls: BTreeMap<String, i64>,
    pub files_examined: Vec<String>,
    pub urls_fetched: Vec<String>,
    pub result_summary: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

impl AgentWorkRecord {
    /// Wall-clock duration of the execution, clamped to non-negative.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => None,
        }
    }
}
