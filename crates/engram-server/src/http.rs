use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use engram_model::Embedder;
use engram_pipeline::{CaptureJob, PipelineHandle};
use engram_store::Store;
use engram_types::{AgentCaptureRequest, CaptureRequest};

use crate::query::{dispatch, to_value, QueryError, QueryRequest};

/// Shared handler state; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub pipeline: PipelineHandle,
    pub embedder: Embedder,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/capture", post(capture))
        .route("/capture/agent", post(capture_agent))
        .route("/embed", post(embed))
        .route("/query", post(query))
        .route("/snapshots/{id}/summary", post(rewrite_summary))
        .route("/health", get(health))
        .route("/api/stats", get(api_stats))
        .route("/api/recent", get(api_recent))
        .route("/api/quality", get(api_quality))
        .route("/api/projects", get(api_projects))
        .route("/api/bugs", get(api_bugs))
        .route("/api/files", get(api_files))
        .route("/api/decisions", get(api_decisions))
        .route("/api/agents/stats", get(api_agent_stats))
        .route("/api/agents/performance", get(api_agent_performance))
        .route("/api/agents/tools", get(api_agent_tools))
        .route("/api/agents/recent", get(api_agent_recent))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Shape check applied before acknowledging a capture.
pub fn validate_capture(request: &CaptureRequest) -> Result<(), String> {
    if request.project_path.trim().is_empty() {
        return Err("project_path is required".to_string());
    }
    if request.trigger.trim().is_empty() {
        return Err("trigger is required".to_string());
    }
    if !request.has_source() {
        return Err("one of conversation_data or transcript_path is required".to_string());
    }
    Ok(())
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "bad_request", "message": message})),
    )
        .into_response()
}

fn busy() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "busy",
            "message": "capture queue is full, retry shortly",
            "retry_after_seconds": 5
        })),
    )
        .into_response()
}

fn submit(state: &AppState, job: CaptureJob, accepted: serde_json::Value) -> Response {
    match state.pipeline.submit(job) {
        Ok(()) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(engram_pipeline::Error::QueueFull) => busy(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "shutting_down", "message": "service is shutting down"})),
        )
            .into_response(),
    }
}

/// `POST /capture`: acknowledge, then process out of band.
async fn capture(State(state): State<AppState>, Json(request): Json<CaptureRequest>) -> Response {
    if let Err(message) = validate_capture(&request) {
        return bad_request(message);
    }

    info!(
        project_path = %request.project_path,
        trigger = %request.trigger,
        session_id = request.session_id.as_deref().unwrap_or(""),
        "capture accepted"
    );

    let accepted = json!({
        "status": "accepted",
        "project_path": request.project_path.clone(),
        "trigger": request.trigger.clone(),
    });
    submit(&state, CaptureJob::Snapshot(request), accepted)
}

/// `POST /capture/agent`: delegated-agent execution capture.
async fn capture_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentCaptureRequest>,
) -> Response {
    if request.parent_session_id.trim().is_empty() {
        return bad_request("parent_session_id is required".to_string());
    }
    if request.agent_id.trim().is_empty() {
        return bad_request("agent_id is required".to_string());
    }

    info!(
        parent_session_id = %request.parent_session_id,
        agent_id = %request.agent_id,
        agent_type = %request.definition.agent_type,
        "agent capture accepted"
    );

    let accepted = json!({
        "status": "accepted",
        "parent_session_id": request.parent_session_id.clone(),
        "agent_id": request.agent_id.clone(),
    });
    submit(&state, CaptureJob::AgentWork(request), accepted)
}

#[derive(Debug, Deserialize)]
struct EmbedBody {
    text: String,
}

/// `POST /embed`: ad-hoc embedding for retrieval clients.
async fn embed(State(state): State<AppState>, Json(body): Json<EmbedBody>) -> Response {
    if body.text.trim().is_empty() {
        return bad_request("text is required".to_string());
    }
    let embedding = state.embedder.embed(&body.text).await;
    Json(json!({
        "status": if embedding.degraded { "degraded" } else { "ok" },
        "embedding": embedding.vector,
        "dimensions": state.embedder.dimension(),
    }))
    .into_response()
}

/// `POST /query`: the retrieval API dispatch.
async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, QueryError> {
    dispatch(&state, request).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct RewriteBody {
    summary: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// `POST /snapshots/{id}/summary`: the enhanced-summary hook. When no
/// embedding accompanies the new summary, one is generated here so the
/// row stays searchable.
async fn rewrite_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RewriteBody>,
) -> Result<Json<serde_json::Value>, QueryError> {
    if body.summary.trim().is_empty() {
        return Err(QueryError::BadRequest("summary is required".to_string()));
    }

    let embedding = match body.embedding {
        Some(vector) => vector,
        None => state.embedder.embed(&body.summary).await.vector,
    };
    state
        .store
        .rewrite_summary(id, &body.summary, Some(embedding))
        .await?;
    Ok(Json(json!({"status": "updated", "id": id})))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "message": err.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QualityParams {
    #[serde(default)]
    min_score: Option<i32>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileParams {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    min_mentions: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AgentParams {
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn api_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, QueryError> {
    let stats = state.store.system_stats().await?;
    Ok(Json(to_value(stats)?))
}

async fn api_recent(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .list_recent(params.project_path.as_deref(), params.limit)
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_quality(
    State(state): State<AppState>,
    Query(params): Query<QualityParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let report = state
        .store
        .quality_report(params.min_score, params.project_path.as_deref(), params.limit)
        .await?;
    Ok(Json(to_value(report)?))
}

async fn api_projects(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .project_stats(params.project_path.as_deref())
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_bugs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .analyze_bugs(None, params.project_path.as_deref(), params.limit)
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_files(
    State(state): State<AppState>,
    Query(params): Query<FileParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .file_activity(params.file_type.as_deref(), params.min_mentions, params.limit)
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_decisions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .search_decisions(None, params.project_path.as_deref(), params.limit)
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_agent_stats(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let performance = state
        .store
        .agent_performance(params.agent_type.as_deref())
        .await?;
    let tool_usage = state
        .store
        .agent_tool_usage(params.agent_type.as_deref())
        .await?;
    Ok(Json(json!({"performance": performance, "tool_usage": tool_usage})))
}

async fn api_agent_performance(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .compare_agent_versions(params.agent_type.as_deref())
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_agent_tools(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state
        .store
        .agent_tool_usage(params.agent_type.as_deref())
        .await?;
    Ok(Json(to_value(rows)?))
}

async fn api_agent_recent(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<serde_json::Value>, QueryError> {
    let rows = state.store.recent_agent_work(params.limit).await?;
    Ok(Json(to_value(rows)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        conversation: Option<serde_json::Value>,
        transcript_path: Option<&str>,
    ) -> CaptureRequest {
        CaptureRequest {
            project_path: "Code/demo".to_string(),
            trigger: "manual".to_string(),
            conversation_data: conversation,
            session_id: None,
            transcript_path: transcript_path.map(String::from),
        }
    }

    #[test]
    fn test_validate_accepts_inline_conversation() {
        let req = request(Some(json!({"messages": []})), None);
        assert!(validate_capture(&req).is_ok());
    }

    #[test]
    fn test_validate_accepts_transcript_path() {
        let req = request(None, Some("/tmp/t.jsonl"));
        assert!(validate_capture(&req).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        let err = validate_capture(&request(None, None)).unwrap_err();
        assert!(err.contains("conversation_data"));
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut req = request(Some(json!({"messages": []})), None);
        req.project_path = "  ".to_string();
        assert!(validate_capture(&req).is_err());

        let mut req = request(Some(json!({"messages": []})), None);
        req.trigger = String::new();
        assert!(validate_capture(&req).is_err());
    }
}
