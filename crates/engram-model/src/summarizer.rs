use std::time::Duration;

use tracing::warn;

use engram_types::{clip_chars, Conversation, Message, PriorSession, SessionMetadata};

use crate::client::OllamaClient;

/// Marker appended when a message is cut to fit the model context.
const TRUNCATION_MARKER: &str = "... [truncated]";
/// Per-message character budget inside the prompt.
const MESSAGE_CHAR_CAP: usize = 500;
/// Character budget for the previous-session summary excerpt.
const PRIOR_EXCERPT_CHARS: usize = 300;

/// How the conversation was reduced to fit the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Every message fit within the head/middle/tail budget.
    Full,
    /// Head, evenly spaced middle sample, and tail were concatenated.
    Sampled,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Full => "full",
            SelectionStrategy::Sampled => "sampled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub model: String,
    /// `false` disables the model path entirely; only the extractive
    /// summary is produced.
    pub use_ai: bool,
    /// Generous, because local models can take minutes on long prompts.
    pub timeout: Duration,
    pub first_n: usize,
    pub middle_n: usize,
    pub last_n: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            use_ai: true,
            timeout: Duration::from_secs(240),
            first_n: 20,
            middle_n: 30,
            last_n: 50,
        }
    }
}

/// Identity of the session being summarized, echoed into the prompt.
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo<'a> {
    pub project_path: &'a str,
    pub session_id: Option<&'a str>,
    pub trigger: &'a str,
}

/// A produced summary plus how it was produced.
#[derive(Debug, Clone)]
pub struct Summary {
    pub text: String,
    /// True when the extractive fallback was used instead of the model.
    pub degraded: bool,
}

/// Session-aware summary generation with an extractive fallback.
#[derive(Debug, Clone)]
pub struct Summarizer {
    client: OllamaClient,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(client: OllamaClient, config: SummarizerConfig) -> Self {
        Self { client, config }
    }

    /// Summarize a conversation.
    ///
    /// `prior` is the most recent earlier snapshot for the same project,
    /// looked up by the coordinator; it anchors the continuity section.
    /// Model failure or a disabled model path falls back to the
    /// extractive summary; a conversation always yields some summary.
    pub async fn summarize(
        &self,
        conversation: &Conversation,
        metadata: &SessionMetadata,
        session: SessionInfo<'_>,
        prior: Option<&PriorSession>,
    ) -> Summary {
        if !self.config.use_ai {
            return Summary {
                text: extractive_summary(conversation),
                degraded: true,
            };
        }

        let prompt = self.build_prompt(conversation, metadata, session, prior);
        match self
            .client
            .generate(&self.config.model, &prompt, self.config.timeout)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Summary {
                text: text.trim().to_string(),
                degraded: false,
            },
            Ok(_) => {
                warn!(
                    project_path = session.project_path,
                    "summarizer returned empty output, using extractive fallback"
                );
                Summary {
                    text: extractive_summary(conversation),
                    degraded: true,
                }
            }
            Err(err) => {
                warn!(
                    project_path = session.project_path,
                    error = %err,
                    "summarizer unavailable, using extractive fallback"
                );
                Summary {
                    text: extractive_summary(conversation),
                    degraded: true,
                }
            }
        }
    }

    /// Pick which messages enter the prompt.
    ///
    /// Not simple truncation: keeps the head of the session (intent),
    /// an evenly spaced sample of the middle (progress), and the tail
    /// (outcome).
    pub fn select_messages<'a>(
        &self,
        conversation: &'a Conversation,
    ) -> (Vec<&'a Message>, SelectionStrategy) {
        let n = conversation.len();
        let budget = self.config.first_n + self.config.middle_n + self.config.last_n;
        if n <= budget {
            return (
                conversation.messages.iter().collect(),
                SelectionStrategy::Full,
            );
        }

        let mut selected: Vec<&Message> =
            conversation.messages[..self.config.first_n].iter().collect();

        let band = &conversation.messages[self.config.first_n..n - self.config.last_n];
        let step = band.len() as f64 / self.config.middle_n as f64;
        let mut last_idx = None;
        for i in 0..self.config.middle_n {
            let idx = (i as f64 * step) as usize;
            if last_idx == Some(idx) {
                continue;
            }
            last_idx = Some(idx);
            selected.push(&band[idx]);
        }

        selected.extend(conversation.messages[n - self.config.last_n..].iter());
        (selected, SelectionStrategy::Sampled)
    }

    fn build_prompt(
        &self,
        conversation: &Conversation,
        metadata: &SessionMetadata,
        session: SessionInfo<'_>,
        prior: Option<&PriorSession>,
    ) -> String {
        let (selected, strategy) = self.select_messages(conversation);

        let mut prompt = String::new();
        prompt.push_str(
            "You are summarizing a coding-assistant session so that future \
             sessions can pick up the work.\n\n",
        );
        prompt.push_str(&format!("Project: {}\n", session.project_path));
        prompt.push_str(&format!(
            "Session: {}\n",
            session.session_id.unwrap_or("unknown")
        ));
        prompt.push_str(&format!("Trigger: {}\n\n", session.trigger));

        match prior {
            Some(prior) => {
                prompt.push_str("Previous session context:\n");
                prompt.push_str(&format!(
                    "- Snapshot #{} captured {}\n",
                    prior.id,
                    prior.captured_at.to_rfc3339()
                ));
                if !prior.tags.is_empty() {
                    prompt.push_str(&format!("- Tags: {}\n", prior.tags.join(", ")));
                }
                prompt.push_str(&format!(
                    "- Summary: {}\n\n",
                    clip_chars(&prior.summary_excerpt, PRIOR_EXCERPT_CHARS)
                ));
            }
            None => {
                prompt.push_str("No previous session recorded for this project.\n\n");
            }
        }

        prompt.push_str("Extracted metadata:\n");
        prompt.push_str(&format!("- Tags: {}\n", metadata.tags.join(", ")));
        prompt.push_str(&format!("- Files: {}\n", metadata.files.join(", ")));
        prompt.push_str(&format!("- Decisions: {}\n", metadata.decisions.join("; ")));
        prompt.push_str(&format!("- Bugs: {}\n\n", metadata.bugs.join("; ")));

        prompt.push_str(&format!(
            "Conversation ({} messages, {} selection):\n",
            conversation.len(),
            strategy.as_str()
        ));
        for message in selected {
            prompt.push_str(&format!(
                "[{}] {}\n",
                message.role.as_str(),
                cap_message(&message.content)
            ));
        }

        prompt.push_str(
            "\nWrite a structured summary with exactly these section headers:\n\
             ## Primary Goal\n\
             ## Files Modified\n\
             ## Features Added\n\
             ## Bugs Fixed\n\
             ## Technical Decisions\n\
             ## Session Metrics\n\
             ## Continuity\n\
             Under Continuity, relate this session to the previous session \
             context when one is given.\n",
        );

        prompt
    }
}

/// Cap one message's content for the prompt, marking the cut.
fn cap_message(content: &str) -> String {
    if content.chars().count() <= MESSAGE_CHAR_CAP {
        content.to_string()
    } else {
        format!("{}{}", clip_chars(content, MESSAGE_CHAR_CAP), TRUNCATION_MARKER)
    }
}

/// Model-free summary: the request, the outcome, and the volume.
pub fn extractive_summary(conversation: &Conversation) -> String {
    let request = conversation
        .first_user()
        .map(|m| clip_chars(&m.content, 200))
        .unwrap_or_default();
    let outcome = conversation
        .last_assistant()
        .map(|m| clip_chars(&m.content, 300))
        .unwrap_or_default();

    format!(
        "Request: {}\n\nOutcome: {}\n\nTotal messages: {}",
        request,
        outcome,
        conversation.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engram_types::Role;

    fn summarizer() -> Summarizer {
        Summarizer::new(OllamaClient::new("http://localhost:11434"), SummarizerConfig::default())
    }

    fn conversation_of(n: usize) -> Conversation {
        Conversation::new(
            (0..n)
                .map(|i| {
                    let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                    Message::new(role, format!("message {i}"))
                })
                .collect(),
        )
    }

    #[test]
    fn test_selection_full_at_exact_budget() {
        let s = summarizer();
        let conv = conversation_of(100); // 20 + 30 + 50
        let (selected, strategy) = s.select_messages(&conv);
        assert_eq!(strategy, SelectionStrategy::Full);
        assert_eq!(selected.len(), 100);
    }

    #[test]
    fn test_selection_sampled_one_past_budget() {
        let s = summarizer();
        let conv = conversation_of(101);
        let (selected, strategy) = s.select_messages(&conv);
        assert_eq!(strategy, SelectionStrategy::Sampled);
        assert!(selected.len() <= 100);
        // Head and tail are intact.
        assert_eq!(selected[0].content, "message 0");
        assert_eq!(selected.last().unwrap().content, "message 100");
    }

    #[test]
    fn test_sampled_middle_is_evenly_spaced_and_ordered() {
        let s = summarizer();
        let conv = conversation_of(500);
        let (selected, _) = s.select_messages(&conv);

        let indices: Vec<usize> = selected
            .iter()
            .map(|m| {
                m.content
                    .strip_prefix("message ")
                    .unwrap()
                    .parse::<usize>()
                    .unwrap()
            })
            .collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(indices, sorted, "selection must be ordered and unique");
        assert_eq!(indices[19], 19);
        assert_eq!(indices[20], 20, "middle band starts right after the head");
        assert_eq!(*indices.last().unwrap(), 499);
    }

    #[test]
    fn test_cap_message_short_unchanged() {
        let content = "a".repeat(500);
        assert_eq!(cap_message(&content), content);
    }

    #[test]
    fn test_cap_message_long_gets_marker() {
        let content = "a".repeat(501);
        let capped = cap_message(&content);
        assert!(capped.ends_with(TRUNCATION_MARKER));
        assert_eq!(capped.chars().count(), 500 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_extractive_summary_template() {
        let conv = Conversation::new(vec![
            Message::new(Role::User, "fix the SQL injection in login"),
            Message::new(Role::Assistant, "patched src/auth.js line 42"),
        ]);
        assert_eq!(
            extractive_summary(&conv),
            "Request: fix the SQL injection in login\n\n\
             Outcome: patched src/auth.js line 42\n\n\
             Total messages: 2"
        );
    }

    #[test]
    fn test_prompt_includes_prior_session() {
        let s = summarizer();
        let conv = conversation_of(4);
        let prior = PriorSession {
            id: 7,
            captured_at: Utc::now(),
            summary_excerpt: "built the ingestion queue".to_string(),
            tags: vec!["feature".to_string()],
        };
        let prompt = s.build_prompt(
            &conv,
            &SessionMetadata::default(),
            SessionInfo {
                project_path: "Code/demo",
                session_id: Some("S"),
                trigger: "manual",
            },
            Some(&prior),
        );
        assert!(prompt.contains("Snapshot #7"));
        assert!(prompt.contains("built the ingestion queue"));
        assert!(prompt.contains("## Continuity"));
    }

    #[test]
    fn test_prompt_states_absence_of_prior_session() {
        let s = summarizer();
        let prompt = s.build_prompt(
            &conversation_of(2),
            &SessionMetadata::default(),
            SessionInfo {
                project_path: "Code/demo",
                session_id: None,
                trigger: "manual",
            },
            None,
        );
        assert!(prompt.contains("No previous session recorded"));
    }

    #[tokio::test]
    async fn test_ai_disabled_uses_extractive_path() {
        let config = SummarizerConfig {
            use_ai: false,
            ..SummarizerConfig::default()
        };
        let s = Summarizer::new(OllamaClient::new("http://localhost:1"), config);
        let conv = Conversation::new(vec![Message::new(Role::User, "hello")]);
        let summary = s
            .summarize(
                &conv,
                &SessionMetadata::default(),
                SessionInfo {
                    project_path: "p",
                    session_id: None,
                    trigger: "manual",
                },
                None,
            )
            .await;
        assert!(summary.degraded);
        assert!(summary.text.starts_with("Request: hello"));
    }
}
