//! Live-database integration tests.
//!
//! These need a PostgreSQL with the pgvector extension reachable via
//! `DATABASE_URL`; run with `cargo test -p engram-store -- --ignored`.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use engram_store::{PersistAction, Store, StoreConfig};
use engram_types::{
    AgentDefinitionSpec, AgentWorkRecord, Conversation, Message, Role, SessionMetadata,
    SnapshotRecord, EMBEDDING_DIM,
};

async fn connect() -> Store {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a pgvector-enabled database");
    let store = Store::connect(&url, StoreConfig::default())
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    store
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn snapshot(session_id: &str, content: &str) -> SnapshotRecord {
    let conversation = Conversation::new(vec![
        Message::new(Role::User, content),
        Message::new(Role::Assistant, "done"),
    ]);
    let size_bytes = conversation.size_bytes();
    SnapshotRecord {
        project_path: "Code/demo".to_string(),
        session_id: Some(session_id.to_string()),
        transcript_path: None,
        trigger: "manual".to_string(),
        summary: format!("Worked on: {content}"),
        embedding: vec![0.1; EMBEDDING_DIM],
        metadata: SessionMetadata::empty_with_count(conversation.len()),
        conversation,
        size_bytes,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_persist_then_get_round_trips() {
    let store = connect().await;
    let session = unique("round-trip");
    let record = snapshot(&session, "fix the login bug");

    let outcome = store.persist(&record).await.expect("persist");
    assert_eq!(outcome.action, PersistAction::Inserted);

    let stored = store.get_snapshot(outcome.id).await.expect("get");
    assert_eq!(stored.session_id.as_deref(), Some(session.as_str()));
    assert_eq!(stored.message_count, 2);
    assert_eq!(stored.raw_context.messages[0].content, "fix the login bug");
    assert_eq!(stored.embedding.expect("embedding").len(), EMBEDDING_DIM);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_same_session_updates_in_place() {
    let store = connect().await;
    let session = unique("upsert");

    let first = store
        .persist(&snapshot(&session, "first capture"))
        .await
        .expect("insert");
    assert_eq!(first.action, PersistAction::Inserted);

    let mut second_record = snapshot(&session, "second capture");
    second_record
        .conversation
        .messages
        .push(Message::new(Role::User, "one more thing"));
    second_record.metadata.message_count = 3;

    let second = store.persist(&second_record).await.expect("update");
    assert_eq!(second.action, PersistAction::Updated);
    assert_eq!(second.id, first.id);

    let stored = store.get_snapshot(first.id).await.expect("get");
    assert_eq!(stored.message_count, 3);
    assert_eq!(stored.raw_context.messages[0].content, "second capture");
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_resubmission_is_idempotent() {
    let store = connect().await;
    let session = unique("idempotent");
    let record = snapshot(&session, "identical content");

    let first = store.persist(&record).await.expect("first");
    let second = store.persist(&record).await.expect("second");
    let third = store.persist(&record).await.expect("third");

    assert_eq!(first.id, second.id);
    assert_eq!(second.id, third.id);
    let stored = store.get_snapshot(first.id).await.expect("get");
    assert_eq!(stored.raw_context.messages[0].content, "identical content");
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_concurrent_captures_leave_one_row() {
    let store = connect().await;
    let session = unique("concurrent");

    let a = snapshot(&session, "writer a");
    let b = snapshot(&session, "writer b");

    let (ra, rb) = tokio::join!(store.persist(&a), store.persist(&b));
    let ra = ra.expect("writer a");
    let rb = rb.expect("writer b");
    assert_eq!(ra.id, rb.id, "both writers must land on one row");

    let stored = store.get_snapshot(ra.id).await.expect("get");
    let content = &stored.raw_context.messages[0].content;
    assert!(content == "writer a" || content == "writer b");
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_transcript_path_also_keys_the_upsert() {
    let store = connect().await;
    let path = format!("/tmp/{}.jsonl", unique("transcript"));

    let mut first = snapshot(&unique("tp-a"), "by transcript");
    first.session_id = None;
    first.transcript_path = Some(path.clone());
    let inserted = store.persist(&first).await.expect("insert");

    let mut second = snapshot(&unique("tp-b"), "recaptured");
    second.session_id = None;
    second.transcript_path = Some(path);
    let updated = store.persist(&second).await.expect("update");

    assert_eq!(inserted.id, updated.id);
    assert_eq!(updated.action, PersistAction::Updated);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_rewrite_summary_updates_in_place() {
    let store = connect().await;
    let outcome = store
        .persist(&snapshot(&unique("rewrite"), "original"))
        .await
        .expect("persist");

    store
        .rewrite_summary(outcome.id, "enhanced summary", Some(vec![0.5; EMBEDDING_DIM]))
        .await
        .expect("rewrite");

    let stored = store.get_snapshot(outcome.id).await.expect("get");
    assert_eq!(stored.summary.as_deref(), Some("enhanced summary"));
}

fn agent_work(session: &str, agent_id: &str, tools: Vec<&str>) -> AgentWorkRecord {
    AgentWorkRecord {
        request_id: Some(unique("req")),
        snapshot_id: None,
        parent_session_id: session.to_string(),
        agent_id: agent_id.to_string(),
        definition: AgentDefinitionSpec {
            agent_type: "researcher".to_string(),
            display_name: Some("Researcher".to_string()),
            system_prompt: "You research the codebase.".to_string(),
            config: serde_json::json!({"temperature": 0.2}),
            tools: tools.into_iter().map(String::from).collect(),
            model: "qwen2.5-coder".to_string(),
            description: None,
            created_by: None,
        },
        task: Some("find the flaky test".to_string()),
        transcript_path: None,
        messages: Conversation::new(vec![Message::new(Role::Assistant, "found it")]),
        tool_calls: BTreeMap::from([("grep".to_string(), 4), ("read".to_string(), 2)]),
        files_examined: vec!["tests/store_tests.rs".to_string()],
        urls_fetched: vec![],
        result_summary: Some("the timeout was too tight".to_string()),
        started_at: Some(chrono::Utc::now() - chrono::Duration::seconds(30)),
        ended_at: Some(chrono::Utc::now()),
        embedding: vec![0.2; EMBEDDING_DIM],
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_identical_blueprints_collapse_to_one_definition() {
    let store = connect().await;
    let session = unique("dedup");

    // Same blueprint content, different tool order.
    let first = store
        .record_agent_work(&agent_work(&session, &unique("agent-a"), vec!["grep", "read"]))
        .await
        .expect("first");
    let second = store
        .record_agent_work(&agent_work(&session, &unique("agent-b"), vec!["read", "grep"]))
        .await
        .expect("second");

    assert_eq!(first.definition_id, second.definition_id);
    assert_eq!(first.definition_version, second.definition_version);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_changed_blueprint_bumps_version() {
    let store = connect().await;
    let session = unique("version");

    let first = store
        .record_agent_work(&agent_work(&session, &unique("agent-a"), vec!["grep"]))
        .await
        .expect("first");

    let mut changed = agent_work(&session, &unique("agent-b"), vec!["grep"]);
    changed.definition.system_prompt = "You research the codebase very carefully.".to_string();
    let second = store.record_agent_work(&changed).await.expect("second");

    assert_ne!(first.definition_id, second.definition_id);
    assert!(second.definition_version > first.definition_version);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_agent_work_upserts_on_agent_and_session() {
    let store = connect().await;
    let session = unique("work-upsert");
    let agent = unique("agent");

    let first = store
        .record_agent_work(&agent_work(&session, &agent, vec!["grep"]))
        .await
        .expect("first");
    assert_eq!(first.action, PersistAction::Inserted);

    let mut again = agent_work(&session, &agent, vec!["grep"]);
    again.result_summary = Some("revised conclusion".to_string());
    let second = store.record_agent_work(&again).await.expect("second");

    assert_eq!(second.action, PersistAction::Updated);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_semantic_search_orders_by_distance() {
    let store = connect().await;
    let session = unique("semantic");

    let mut near = snapshot(&session, "vector neighbor");
    near.embedding = vec![1.0; EMBEDDING_DIM];
    store.persist(&near).await.expect("persist");

    let hits = store
        .semantic_search(&vec![1.0; EMBEDDING_DIM], Some("Code/demo"), Some(5))
        .await
        .expect("search");
    assert!(!hits.is_empty());
    let mut last = -1.0;
    for hit in &hits {
        let d = hit.distance.expect("distance");
        assert!(d >= last, "distances must ascend");
        last = d;
    }
}
