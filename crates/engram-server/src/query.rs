use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::http::AppState;

/// Every operation the retrieval surface understands.
pub const TOOLS: &[&str] = &[
    "search_memory",
    "search_raw_messages",
    "search_exact_phrase",
    "get_timeline",
    "get_snapshot",
    "get_quality_report",
    "get_project_stats",
    "search_decisions",
    "analyze_bugs",
    "get_file_activity",
    "search_agent_work",
    "get_agent_analytics",
    "compare_agent_configs",
];

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Retrieval failure taxonomy, mapped onto HTTP in `IntoResponse`.
#[derive(Debug)]
pub enum QueryError {
    UnknownOperation(String),
    BadRequest(String),
    Store(engram_store::Error),
}

impl From<engram_store::Error> for QueryError {
    fn from(err: engram_store::Error) -> Self {
        QueryError::Store(err)
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            QueryError::UnknownOperation(tool) => (
                StatusCode::NOT_FOUND,
                "unknown_operation",
                format!("unknown tool: {tool}; known tools: {}", TOOLS.join(", ")),
            ),
            QueryError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            QueryError::Store(engram_store::Error::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no snapshot with id {id}"),
            ),
            QueryError::Store(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                err.to_string(),
            ),
        };
        (status, Json(json!({"error": error, "message": message}))).into_response()
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, QueryError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| QueryError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PhraseArgs {
    phrase: String,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ScopeArgs {
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct QualityArgs {
    #[serde(default)]
    min_score: Option<i32>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DecisionArgs {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BugArgs {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileActivityArgs {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    min_mentions: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AgentSearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AgentTypeArgs {
    #[serde(default)]
    agent_type: Option<String>,
}

pub(crate) fn to_value<T: serde::Serialize>(value: T) -> Result<Value, QueryError> {
    serde_json::to_value(value).map_err(|e| QueryError::Store(engram_store::Error::Fatal(e.to_string())))
}

/// Route one retrieval operation to the store.
pub async fn dispatch(state: &AppState, request: QueryRequest) -> Result<Value, QueryError> {
    match request.tool.as_str() {
        "search_memory" => {
            let args: SearchArgs = parse_args(request.arguments)?;
            let embedding = state.embedder.embed(&args.query).await;
            // A degraded query vector would rank against nothing useful;
            // fall back to the lexical path instead.
            let hits = if embedding.degraded {
                warn!("query embedding degraded, using lexical search");
                state
                    .store
                    .lexical_search(&args.query, args.project_path.as_deref(), args.limit)
                    .await?
            } else {
                state
                    .store
                    .semantic_search(
                        &embedding.vector,
                        args.project_path.as_deref(),
                        args.limit,
                    )
                    .await?
            };
            to_value(hits)
        }
        "search_raw_messages" => {
            let args: SearchArgs = parse_args(request.arguments)?;
            let hits = state
                .store
                .search_raw_messages(&args.query, args.project_path.as_deref(), args.limit)
                .await?;
            to_value(hits)
        }
        "search_exact_phrase" => {
            let args: PhraseArgs = parse_args(request.arguments)?;
            let hits = state
                .store
                .search_exact_phrase(&args.phrase, args.project_path.as_deref(), args.limit)
                .await?;
            to_value(hits)
        }
        "get_timeline" => {
            let args: ScopeArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .timeline(args.project_path.as_deref(), args.limit)
                .await?;
            to_value(rows)
        }
        "get_snapshot" => {
            let args: SnapshotArgs = parse_args(request.arguments)?;
            let snapshot = state.store.get_snapshot(args.id).await?;
            to_value(snapshot)
        }
        "get_quality_report" => {
            let args: QualityArgs = parse_args(request.arguments)?;
            let report = state
                .store
                .quality_report(args.min_score, args.project_path.as_deref(), args.limit)
                .await?;
            to_value(report)
        }
        "get_project_stats" => {
            let args: ScopeArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .project_stats(args.project_path.as_deref())
                .await?;
            to_value(rows)
        }
        "search_decisions" => {
            let args: DecisionArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .search_decisions(
                    args.keyword.as_deref(),
                    args.project_path.as_deref(),
                    args.limit,
                )
                .await?;
            to_value(rows)
        }
        "analyze_bugs" => {
            let args: BugArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .analyze_bugs(
                    args.category.as_deref(),
                    args.project_path.as_deref(),
                    args.limit,
                )
                .await?;
            to_value(rows)
        }
        "get_file_activity" => {
            let args: FileActivityArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .file_activity(args.file_type.as_deref(), args.min_mentions, args.limit)
                .await?;
            to_value(rows)
        }
        "search_agent_work" => {
            let args: AgentSearchArgs = parse_args(request.arguments)?;
            let embedding = state.embedder.embed(&args.query).await;
            let hits = if embedding.degraded {
                state
                    .store
                    .lexical_agent_search(&args.query, args.limit)
                    .await?
            } else {
                state
                    .store
                    .semantic_agent_search(&embedding.vector, args.limit)
                    .await?
            };
            to_value(hits)
        }
        "get_agent_analytics" => {
            let args: AgentTypeArgs = parse_args(request.arguments)?;
            let performance = state
                .store
                .agent_performance(args.agent_type.as_deref())
                .await?;
            let tool_usage = state
                .store
                .agent_tool_usage(args.agent_type.as_deref())
                .await?;
            Ok(json!({"performance": performance, "tool_usage": tool_usage}))
        }
        "compare_agent_configs" => {
            let args: AgentTypeArgs = parse_args(request.arguments)?;
            let rows = state
                .store
                .compare_agent_versions(args.agent_type.as_deref())
                .await?;
            to_value(rows)
        }
        other => Err(QueryError::UnknownOperation(other.to_string())),
    }
}
