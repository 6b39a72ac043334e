use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use engram_extract::{conversation_from_value, extract_metadata, read_transcript};
use engram_model::{Embedder, SessionInfo, Summarizer};
use engram_store::{AgentWorkOutcome, PersistOutcome, Store};
use engram_types::{
    clip_chars, AgentCaptureRequest, AgentWorkRecord, CaptureRequest, Conversation,
    SnapshotRecord,
};

use crate::job::CaptureJob;
use crate::{Error, Result};

/// Time budget for one transcript file read. A path on a stuck mount
/// must not hold a worker past the shutdown grace window.
const TRANSCRIPT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs one capture through its five ordered stages: resolve the
/// conversation, extract metadata, summarize, embed, persist.
///
/// Stages two through four degrade rather than fail; persistence is the
/// only stage that can abort a capture once a conversation resolved.
pub struct Coordinator {
    summarizer: Summarizer,
    embedder: Embedder,
    store: Store,
    /// Base directory for resolving relative project paths (and with
    /// them, VCS state).
    workspace_root: Option<PathBuf>,
}

impl Coordinator {
    pub fn new(
        summarizer: Summarizer,
        embedder: Embedder,
        store: Store,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        Self {
            summarizer,
            embedder,
            store,
            workspace_root,
        }
    }

    /// Process one job to its terminal outcome, logging it. Never
    /// returns an error: the request was already acknowledged, so
    /// failures exist only in the logs.
    pub async fn handle(&self, job: CaptureJob) {
        match job {
            CaptureJob::Snapshot(request) => {
                let (project_path, trigger) = (request.project_path.clone(), request.trigger.clone());
                let session_id = request.session_id.clone().unwrap_or_default();
                match self.run_capture(request).await {
                    Ok(outcome) => info!(
                        project_path,
                        trigger,
                        session_id,
                        snapshot_id = outcome.id,
                        action = ?outcome.action,
                        "capture persisted"
                    ),
                    Err(Error::EmptyConversation) => warn!(
                        project_path,
                        trigger, session_id, "capture aborted: empty conversation"
                    ),
                    Err(err) => error!(
                        project_path,
                        trigger,
                        session_id,
                        error = %err,
                        "capture failed"
                    ),
                }
            }
            CaptureJob::AgentWork(request) => {
                let parent_session_id = request.parent_session_id.clone();
                let agent_id = request.agent_id.clone();
                match self.run_agent_capture(request).await {
                    Ok(outcome) => info!(
                        parent_session_id,
                        agent_id,
                        work_id = outcome.id,
                        definition_id = outcome.definition_id,
                        "agent work persisted"
                    ),
                    Err(err) => error!(
                        parent_session_id,
                        agent_id,
                        error = %err,
                        "agent capture failed"
                    ),
                }
            }
        }
    }

    /// The snapshot pipeline. Stages run strictly in order; persistence
    /// does not begin until the record is complete.
    pub async fn run_capture(&self, request: CaptureRequest) -> Result<PersistOutcome> {
        // Stage 1: resolve the conversation.
        let conversation = self.resolve_conversation(&request).await?;
        if conversation.is_empty() {
            return Err(Error::EmptyConversation);
        }

        // Stage 2: extract metadata. Runs off the async thread because
        // the VCS probe touches the filesystem.
        let project_dir = self.resolve_project_dir(&request.project_path);
        let conv = conversation.clone();
        let mut metadata = tokio::task::spawn_blocking(move || {
            extract_metadata(&conv, project_dir.as_deref())
        })
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "metadata extraction aborted, continuing with counts only");
            engram_types::SessionMetadata::default()
        });
        metadata.message_count = conversation.len();

        // Stage 3: summarize, primed with the previous snapshot for the
        // project when one exists.
        let prior = match self.store.latest_for_project(&request.project_path).await {
            Ok(prior) => prior,
            Err(err) => {
                warn!(error = %err, "prior-session lookup failed, summarizing without it");
                None
            }
        };
        let summary = self
            .summarizer
            .summarize(
                &conversation,
                &metadata,
                SessionInfo {
                    project_path: &request.project_path,
                    session_id: request.session_id.as_deref(),
                    trigger: &request.trigger,
                },
                prior.as_ref(),
            )
            .await;

        // Stage 4: embed the summary text.
        let embedding = self.embedder.embed(&summary.text).await;

        // Stage 5: persist, single-shot.
        let size_bytes = conversation.size_bytes();
        let record = SnapshotRecord {
            project_path: request.project_path,
            session_id: request.session_id,
            transcript_path: request.transcript_path,
            trigger: request.trigger,
            conversation,
            summary: summary.text,
            embedding: embedding.vector,
            metadata,
            size_bytes,
        };
        Ok(self.store.persist(&record).await?)
    }

    /// The agent-work pipeline: resolve the agent's messages, derive
    /// its activity, embed the result, persist with definition dedup.
    pub async fn run_agent_capture(
        &self,
        request: AgentCaptureRequest,
    ) -> Result<AgentWorkOutcome> {
        let (messages, derived) = match &request.messages {
            Some(value) => (
                conversation_from_value(value),
                derive_agent_activity(value),
            ),
            None => match &request.transcript_path {
                Some(path) => {
                    let conversation = self.read_transcript_file(path).await?;
                    (conversation, AgentActivity::default())
                }
                None => (Conversation::default(), AgentActivity::default()),
            },
        };

        let result_summary = request.result_summary.clone().or_else(|| {
            messages
                .last_assistant()
                .map(|m| clip_chars(&m.content, 300))
        });

        let embed_text = result_summary
            .clone()
            .or_else(|| request.task.clone())
            .unwrap_or_default();
        let embedding = if embed_text.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&embed_text).await.vector
        };

        let record = AgentWorkRecord {
            request_id: request.request_id,
            snapshot_id: None,
            parent_session_id: request.parent_session_id,
            agent_id: request.agent_id,
            definition: request.definition,
            task: request.task,
            transcript_path: request.transcript_path,
            messages,
            tool_calls: request.tool_calls.unwrap_or(derived.tool_calls),
            files_examined: request.files_examined.unwrap_or(derived.files_examined),
            urls_fetched: request.urls_fetched.unwrap_or(derived.urls_fetched),
            result_summary,
            started_at: request.started_at,
            ended_at: request.ended_at,
            embedding,
        };

        Ok(self.store.record_agent_work(&record).await?)
    }

    async fn resolve_conversation(&self, request: &CaptureRequest) -> Result<Conversation> {
        if let Some(value) = &request.conversation_data {
            return Ok(conversation_from_value(value));
        }
        if let Some(path) = &request.transcript_path {
            return self.read_transcript_file(path).await;
        }
        Err(Error::MissingSource)
    }

    /// Read a transcript off the async thread, bounded by its own
    /// clock like every other suspension point in the pipeline.
    async fn read_transcript_file(&self, path: &str) -> Result<Conversation> {
        let path = PathBuf::from(path);
        let read = tokio::task::spawn_blocking(move || read_transcript(&path));
        match tokio::time::timeout(TRANSCRIPT_READ_TIMEOUT, read).await {
            Ok(joined) => Ok(joined.map_err(|e| Error::Internal(e.to_string()))??),
            Err(_) => Err(Error::TranscriptTimeout),
        }
    }

    fn resolve_project_dir(&self, project_path: &str) -> Option<PathBuf> {
        let path = Path::new(project_path);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        self.workspace_root.as_ref().map(|root| root.join(path))
    }
}

/// Activity derived from an agent's raw message document.
#[derive(Debug, Default, PartialEq)]
pub struct AgentActivity {
    pub tool_calls: BTreeMap<String, i64>,
    pub files_examined: Vec<String>,
    pub urls_fetched: Vec<String>,
}

/// Walk tool-use blocks in a raw message document and roll up which
/// tools ran, which files they touched, and which urls they fetched.
pub fn derive_agent_activity(value: &Value) -> AgentActivity {
    let mut activity = AgentActivity::default();

    let items: &[Value] = match value {
        Value::Object(map) => match map.get("messages") {
            Some(Value::Array(items)) => items,
            _ => return activity,
        },
        Value::Array(items) => items,
        _ => return activity,
    };

    for item in items {
        let content = item
            .get("message")
            .and_then(|m| m.get("content"))
            .or_else(|| item.get("content"));
        let Some(Value::Array(blocks)) = content else {
            continue;
        };

        for block in blocks {
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            let Some(name) = block.get("name").and_then(Value::as_str) else {
                continue;
            };
            *activity.tool_calls.entry(name.to_string()).or_insert(0) += 1;

            let input = block.get("input");
            if let Some(file) = input
                .and_then(|i| i.get("file_path"))
                .and_then(Value::as_str)
            {
                if !activity.files_examined.iter().any(|f| f == file) {
                    activity.files_examined.push(file.to_string());
                }
            }
            if let Some(url) = input.and_then(|i| i.get("url")).and_then(Value::as_str) {
                if !activity.urls_fetched.iter().any(|u| u == url) {
                    activity.urls_fetched.push(url.to_string());
                }
            }
        }
    }

    activity
}
