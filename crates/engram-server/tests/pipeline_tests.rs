//! End-to-end capture pipeline tests against a live database.
//!
//! The model endpoints are deliberately unreachable, so these exercise
//! the degradation ladder: extractive summaries and synthetic vectors
//! must still yield complete, retrievable rows. Run with
//! `cargo test -p engram-server -- --ignored`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;

use engram_model::{
    synthetic_vector, Embedder, EmbedderConfig, OllamaClient, Summarizer, SummarizerConfig,
};
use engram_pipeline::Coordinator;
use engram_store::{PersistAction, Store, StoreConfig};
use engram_types::{CaptureRequest, EMBEDDING_DIM};

async fn store() -> Store {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a pgvector-enabled database");
    let store = Store::connect(&url, StoreConfig::default())
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    store
}

/// Coordinator with no reachable model endpoints and a short summarizer
/// timeout so degraded paths resolve quickly.
fn coordinator(store: Store) -> Arc<Coordinator> {
    let client = OllamaClient::new("http://127.0.0.1:9");
    let summarizer = Summarizer::new(
        client.clone(),
        SummarizerConfig {
            timeout: Duration::from_millis(500),
            ..SummarizerConfig::default()
        },
    );
    let embedder = Embedder::new(
        client,
        EmbedderConfig {
            timeout: Duration::from_millis(500),
            ..EmbedderConfig::default()
        },
    );
    Arc::new(Coordinator::new(summarizer, embedder, store, None))
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn security_fix_request(session_id: &str) -> CaptureRequest {
    CaptureRequest {
        project_path: "Code/demo".to_string(),
        trigger: "manual".to_string(),
        conversation_data: Some(json!({
            "messages": [
                {"role": "user", "content": "fix the SQL injection in login"},
                {"role": "assistant",
                 "content": "patched src/auth.js line 42; added tests in test/auth.test.js"}
            ]
        })),
        session_id: Some(session_id.to_string()),
        transcript_path: None,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_single_capture_happy_path() {
    let store = store().await;
    let coordinator = coordinator(store.clone());
    let session = unique("e2e-happy");

    let outcome = coordinator
        .run_capture(security_fix_request(&session))
        .await
        .expect("capture");
    assert_eq!(outcome.action, PersistAction::Inserted);

    let snapshot = store.get_snapshot(outcome.id).await.expect("get");
    assert!(snapshot.tags.iter().any(|t| t == "security"));
    assert!(snapshot.tags.iter().any(|t| t == "bug-fix"));
    assert!(snapshot.mentioned_files.iter().any(|f| f == "src/auth.js"));
    assert!(snapshot
        .mentioned_files
        .iter()
        .any(|f| f == "test/auth.test.js"));
    assert!(snapshot.summary.as_deref().is_some_and(|s| !s.is_empty()));
    assert_eq!(snapshot.embedding.expect("embedding").len(), EMBEDDING_DIM);
    assert_eq!(snapshot.message_count, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_summarizer_outage_writes_extractive_row() {
    let store = store().await;
    let coordinator = coordinator(store.clone());
    let session = unique("e2e-outage");

    let outcome = coordinator
        .run_capture(security_fix_request(&session))
        .await
        .expect("capture");

    let snapshot = store.get_snapshot(outcome.id).await.expect("get");
    let summary = snapshot.summary.expect("summary");
    assert!(summary.starts_with("Request: fix the SQL injection in login"));
    assert!(summary.contains("Outcome: patched src/auth.js line 42"));
    assert!(summary.ends_with("Total messages: 2"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_embedder_outage_row_stays_searchable() {
    let store = store().await;
    let coordinator = coordinator(store.clone());
    let session = unique("e2e-embed");

    let outcome = coordinator
        .run_capture(security_fix_request(&session))
        .await
        .expect("capture");

    let snapshot = store.get_snapshot(outcome.id).await.expect("get");
    let embedding = snapshot.embedding.expect("embedding");
    let summary = snapshot.summary.expect("summary");
    assert_eq!(embedding, synthetic_vector(&summary, EMBEDDING_DIM));

    // The write-side fallback vector still ranks under the same
    // degraded query embedding.
    let query_vector = synthetic_vector(&summary, EMBEDDING_DIM);
    let hits = store
        .semantic_search(&query_vector, Some("Code/demo"), Some(5))
        .await
        .expect("search");
    assert!(hits.iter().any(|h| h.snapshot.id == outcome.id));

    // And the lexical fallback finds it by summary text.
    let lexical = store
        .lexical_search("SQL injection", Some("Code/demo"), Some(5))
        .await
        .expect("lexical");
    assert!(lexical.iter().any(|h| h.snapshot.id == outcome.id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_empty_conversation_writes_no_row() {
    let store = store().await;
    let coordinator = coordinator(store.clone());
    let session = unique("e2e-empty");

    let request = CaptureRequest {
        conversation_data: Some(json!({"messages": []})),
        ..security_fix_request(&session)
    };
    let result = coordinator.run_capture(request).await;
    assert!(matches!(
        result,
        Err(engram_pipeline::Error::EmptyConversation)
    ));

    let recent = store
        .list_recent(Some("Code/demo"), Some(50))
        .await
        .expect("recent");
    assert!(recent.iter().all(|r| r.session_id.as_deref() != Some(session.as_str())));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_transcript_file_capture() {
    use std::io::Write;

    let store = store().await;
    let coordinator = coordinator(store.clone());
    let session = unique("e2e-transcript");

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        file,
        r#"{{"type":"user","message":{{"role":"user","content":"add retry logic"}},"sessionId":"{session}"}}"#
    )
    .expect("write");
    writeln!(file, "not json").expect("write");
    writeln!(
        file,
        r#"{{"type":"assistant","message":{{"role":"assistant","content":"wrapped the call in a backoff loop"}}}}"#
    )
    .expect("write");

    let request = CaptureRequest {
        project_path: "Code/demo".to_string(),
        trigger: "auto-compact".to_string(),
        conversation_data: None,
        session_id: Some(session.clone()),
        transcript_path: Some(file.path().to_string_lossy().into_owned()),
    };

    let outcome = coordinator.run_capture(request).await.expect("capture");
    let snapshot = store.get_snapshot(outcome.id).await.expect("get");
    assert_eq!(snapshot.message_count, 2);
    assert_eq!(snapshot.trigger_event, "auto-compact");
}
