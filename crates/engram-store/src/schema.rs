// Schema is applied idempotently at startup; every statement tolerates
// re-execution so restarts and parallel bootstraps are safe.

pub(crate) const SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS context_snapshots (
    id BIGSERIAL PRIMARY KEY,
    project_path TEXT NOT NULL,
    session_id TEXT,
    transcript_path TEXT,
    captured_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    trigger_event TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    raw_context JSONB NOT NULL,
    summary TEXT,
    embedding vector(384),
    tags TEXT[] NOT NULL DEFAULT '{}',
    mentioned_files TEXT[] NOT NULL DEFAULT '{}',
    key_decisions TEXT[] NOT NULL DEFAULT '{}',
    bugs_fixed TEXT[] NOT NULL DEFAULT '{}',
    git_commit_hash TEXT,
    git_branch TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshots_session
    ON context_snapshots (session_id) WHERE session_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshots_transcript
    ON context_snapshots (transcript_path) WHERE transcript_path IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_snapshots_project ON context_snapshots (project_path);
CREATE INDEX IF NOT EXISTS idx_snapshots_captured ON context_snapshots (captured_at DESC);
CREATE INDEX IF NOT EXISTS idx_snapshots_trigger ON context_snapshots (trigger_event);
CREATE INDEX IF NOT EXISTS idx_snapshots_tags ON context_snapshots USING GIN (tags);
CREATE INDEX IF NOT EXISTS idx_snapshots_files ON context_snapshots USING GIN (mentioned_files);
CREATE INDEX IF NOT EXISTS idx_snapshots_raw ON context_snapshots USING GIN (raw_context jsonb_path_ops);
CREATE INDEX IF NOT EXISTS idx_snapshots_embedding
    ON context_snapshots USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100);

CREATE TABLE IF NOT EXISTS agent_definitions (
    id BIGSERIAL PRIMARY KEY,
    agent_type TEXT NOT NULL,
    display_name TEXT,
    system_prompt TEXT NOT NULL,
    config JSONB NOT NULL DEFAULT '{}'::jsonb,
    tools TEXT[] NOT NULL DEFAULT '{}',
    model TEXT NOT NULL,
    version INTEGER NOT NULL,
    parent_definition_id BIGINT REFERENCES agent_definitions (id),
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by TEXT,
    config_hash TEXT NOT NULL,
    UNIQUE (agent_type, config_hash),
    UNIQUE (agent_type, version)
);

CREATE TABLE IF NOT EXISTS agent_work (
    id BIGSERIAL PRIMARY KEY,
    request_id TEXT,
    snapshot_id BIGINT REFERENCES context_snapshots (id),
    parent_session_id TEXT NOT NULL,
    definition_id BIGINT NOT NULL REFERENCES agent_definitions (id),
    agent_id TEXT NOT NULL,
    task TEXT,
    transcript_path TEXT,
    messages JSONB NOT NULL DEFAULT '{"messages":[]}'::jsonb,
    tool_calls JSONB NOT NULL DEFAULT '{}'::jsonb,
    files_examined TEXT[] NOT NULL DEFAULT '{}',
    urls_fetched TEXT[] NOT NULL DEFAULT '{}',
    result_summary TEXT,
    started_at TIMESTAMPTZ,
    ended_at TIMESTAMPTZ,
    embedding vector(384),
    UNIQUE (agent_id, parent_session_id)
);

CREATE INDEX IF NOT EXISTS idx_agent_work_session ON agent_work (parent_session_id);
CREATE INDEX IF NOT EXISTS idx_agent_work_definition ON agent_work (definition_id);
CREATE INDEX IF NOT EXISTS idx_agent_work_request ON agent_work (request_id);
CREATE INDEX IF NOT EXISTS idx_agent_work_embedding
    ON agent_work USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100);

CREATE OR REPLACE VIEW snapshot_quality AS
SELECT
    id AS snapshot_id,
    project_path,
    captured_at,
    (summary IS NOT NULL AND length(summary) > 50)::int
        + (embedding IS NOT NULL)::int
        + (cardinality(tags) > 0)::int
        + (cardinality(mentioned_files) > 0)::int
        + (cardinality(key_decisions) > 0)::int
        + (cardinality(bugs_fixed) > 0)::int
        + (git_commit_hash IS NOT NULL)::int
        + (session_id IS NOT NULL)::int
        + (message_count >= 5)::int
        + (length(coalesce(summary, '')) > 200)::int
    AS score
FROM context_snapshots;

CREATE OR REPLACE VIEW project_stats AS
SELECT
    project_path,
    count(*) AS snapshot_count,
    count(DISTINCT session_id) AS session_count,
    coalesce(sum(message_count), 0)::bigint AS total_messages,
    coalesce(sum(size_bytes), 0)::bigint AS total_bytes,
    min(captured_at) AS first_capture,
    max(captured_at) AS last_capture
FROM context_snapshots
GROUP BY project_path;

CREATE OR REPLACE VIEW capture_timeline AS
SELECT
    id AS snapshot_id,
    project_path,
    session_id,
    captured_at,
    trigger_event,
    CASE
        WHEN trigger_event ILIKE '%auto%' THEN 'automatic'
        WHEN trigger_event ILIKE '%post%' THEN 'post-compact'
        WHEN trigger_event ILIKE '%manual%' THEN 'manual'
        ELSE 'other'
    END AS trigger_class,
    message_count,
    left(coalesce(summary, ''), 160) AS summary_excerpt
FROM context_snapshots;

CREATE OR REPLACE VIEW decision_log AS
SELECT
    id AS snapshot_id,
    project_path,
    captured_at,
    unnest(key_decisions) AS decision
FROM context_snapshots;

CREATE OR REPLACE VIEW bug_ledger AS
SELECT
    id AS snapshot_id,
    project_path,
    captured_at,
    unnest(bugs_fixed) AS bug
FROM context_snapshots;

CREATE OR REPLACE VIEW file_heatmap AS
SELECT
    file,
    count(*) AS mentions,
    count(DISTINCT project_path) AS project_count,
    max(captured_at) AS last_seen
FROM (
    SELECT project_path, captured_at, unnest(mentioned_files) AS file
    FROM context_snapshots
) mentions
GROUP BY file;

CREATE OR REPLACE VIEW agent_performance AS
SELECT
    d.id AS definition_id,
    d.agent_type,
    d.display_name,
    d.version,
    count(w.id) AS times_used,
    avg(extract(epoch FROM (w.ended_at - w.started_at))) AS avg_duration_seconds,
    avg(jsonb_array_length(w.messages -> 'messages')) AS avg_message_count,
    (avg((w.ended_at IS NOT NULL AND coalesce(w.result_summary, '') <> '')::int)
        FILTER (WHERE w.id IS NOT NULL))::float8 AS success_rate
FROM agent_definitions d
LEFT JOIN agent_work w ON w.definition_id = d.id
GROUP BY d.id;

CREATE OR REPLACE VIEW agent_tool_usage AS
SELECT
    d.agent_type,
    t.key AS tool,
    sum((t.value)::bigint)::bigint AS calls
FROM agent_work w
JOIN agent_definitions d ON d.id = w.definition_id,
LATERAL jsonb_each_text(w.tool_calls) AS t
GROUP BY d.agent_type, t.key;
"#;
