use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use engram_types::{Conversation, Message, Role};

use crate::Result;

/// Loose envelope over one transcript line.
///
/// Real transcripts interleave tool-use records, file snapshots, and
/// provider-specific entries whose schemas drift over time. Only records
/// that yield a `{role, content}` shape become messages; everything else
/// is skipped.
#[derive(Debug, Deserialize)]
struct LineRecord {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    message: Option<InnerMessage>,
}

#[derive(Debug, Deserialize)]
struct InnerMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
}

/// Read a line-delimited JSON transcript into a conversation.
///
/// Malformed lines are skipped with a warning; they are not
/// reconstructible and must not fail the capture.
pub fn read_transcript(path: &Path) -> Result<Conversation> {
    let text = std::fs::read_to_string(path)?;

    let mut messages = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                if let Some(message) = message_from_value(&value) {
                    messages.push(message);
                }
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "skipping malformed transcript line"
                );
            }
        }
    }

    Ok(Conversation::new(messages))
}

/// Normalize an inline conversation document.
///
/// Accepts `{"messages": [...]}` or a bare message array.
pub fn conversation_from_value(value: &Value) -> Conversation {
    let items = match value {
        Value::Object(map) => match map.get("messages") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Conversation::default(),
        },
        Value::Array(items) => items.as_slice(),
        _ => return Conversation::default(),
    };

    let messages = items.iter().filter_map(message_from_value).collect();
    Conversation::new(messages)
}

/// Extract a `{role, content}` message from an arbitrary record shape.
///
/// Claude-style transcripts nest the message under a `message` key; the
/// nested form wins when both are present.
fn message_from_value(value: &Value) -> Option<Message> {
    let record: LineRecord = serde_json::from_value(value.clone()).ok()?;

    let (role, content) = match record.message {
        Some(inner) if inner.role.is_some() => (inner.role, inner.content),
        _ => (record.role, record.content),
    };

    let role = parse_role(role.as_deref()?)?;
    let content = flatten_content(content.as_ref()?)?;
    if content.is_empty() {
        return None;
    }

    Some(Message::new(role, content))
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

/// Flatten message content to plain text.
///
/// Content arrives as a plain string or as an array of content blocks;
/// only `text`-bearing blocks contribute. Tool-use and tool-result
/// blocks have no text and drop out here.
fn flatten_content(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let mut out = String::new();
            for block in blocks {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_conversation_from_messages_object() {
        let value = serde_json::json!({
            "messages": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "hi"}
            ]
        });
        let conv = conversation_from_value(&value);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
    }

    #[test]
    fn test_conversation_from_bare_array() {
        let value = serde_json::json!([{"role": "user", "content": "hello"}]);
        assert_eq!(conversation_from_value(&value).len(), 1);
    }

    #[test]
    fn test_block_content_concatenates_text() {
        let value = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "part one"},
                {"type": "tool_use", "id": "t1", "name": "bash", "input": {}},
                {"type": "text", "text": "part two"}
            ]
        });
        let msg = message_from_value(&value).unwrap();
        assert_eq!(msg.content, "part one\npart two");
    }

    #[test]
    fn test_nested_message_envelope() {
        let value = serde_json::json!({
            "type": "user",
            "sessionId": "abc",
            "message": {"role": "user", "content": "nested"}
        });
        let msg = message_from_value(&value).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "nested");
    }

    #[test]
    fn test_tool_only_record_skipped() {
        let value = serde_json::json!({
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "t1", "name": "bash", "input": {}}]
        });
        assert!(message_from_value(&value).is_none());
    }

    #[test]
    fn test_read_transcript_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"role":"user","content":"first"}}"#).unwrap();
        writeln!(file, "{{not json at all").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"type":"file-history-snapshot","messageId":"m1"}}"#).unwrap();
        writeln!(file, r#"{{"role":"assistant","content":"second"}}"#).unwrap();

        let conv = read_transcript(file.path()).unwrap();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages[0].content, "first");
        assert_eq!(conv.messages[1].content, "second");
    }

    #[test]
    fn test_read_transcript_missing_file_is_error() {
        assert!(read_transcript(Path::new("/nonexistent/t.jsonl")).is_err());
    }
}
