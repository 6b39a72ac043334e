use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use engram_types::{
    Conversation, SessionMetadata, MAX_BUGS, MAX_DECISIONS, MAX_FILES, MAX_PHRASE_CHARS, MAX_TAGS,
};

use crate::vcs::probe_git_state;

/// Fixed keyword-to-tag table, scanned in declaration order.
///
/// A tag is emitted when any of its keywords occurs anywhere in the
/// case-folded conversation text.
static TAG_RULES: &[(&str, &[&str])] = &[
    ("bug-fix", &["bug", "fix", "fixed", "error", "issue"]),
    ("feature", &["feature", "implement", "new functionality"]),
    ("refactor", &["refactor", "restructure", "clean up", "cleanup"]),
    ("testing", &["test", "tests", "testing", "assertion"]),
    ("database", &["database", "sql", "migration", "schema", "query"]),
    ("api", &["api", "endpoint", "route", "rest"]),
    ("frontend", &["frontend", "component", "css", "react", "ui"]),
    ("security", &["security", "vulnerability", "injection", "auth", "xss"]),
    ("performance", &["performance", "optimize", "slow", "latency", "cache"]),
    ("config", &["config", "configuration", "environment variable", "settings"]),
    ("docs", &["documentation", "readme", "docstring"]),
    ("deploy", &["deploy", "deployment", "release", "pipeline"]),
];

static FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b
        (?:[a-z0-9_.@-]+/)*            # optional directory segments
        [a-z0-9_.@-]+
        \.(?:rs|js|jsx|ts|tsx|py|go|java|rb|c|h|cpp|hpp|cs|php|swift|kt|
             sh|bash|zsh|sql|json|yaml|yml|toml|ini|cfg|conf|md|rst|html|
             css|scss|vue|svelte|proto|tf|dockerfile|lock)
        \b",
    )
    .expect("file pattern is valid")
});

static DECISION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"decided to ([^.\n]+)",
        r"chose to ([^.\n]+)",
        r"implemented ([^.\n]+)",
        r"will use ([^.\n]+)",
        r"using ([^.\n]+)",
        r"(?:approach|solution|strategy):\s*([^.\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("decision pattern is valid"))
    .collect()
});

static BUG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:fixed|resolved|bug:)\s*([^.\n]+)",
        r"(?:error|issue):\s*([^.\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("bug pattern is valid"))
    .collect()
});

/// Derive tags, file mentions, decisions, bugs, and VCS state from a
/// conversation.
///
/// Deterministic for a given message sequence; the git probe is the only
/// part that touches the environment and it fails silently.
pub fn extract_metadata(
    conversation: &Conversation,
    project_path: Option<&Path>,
) -> SessionMetadata {
    let text = conversation.combined_text().to_lowercase();

    let (git_commit_hash, git_branch) = match project_path {
        Some(path) => probe_git_state(path),
        None => (None, None),
    };

    SessionMetadata {
        tags: extract_tags(&text),
        files: extract_files(&text),
        decisions: extract_phrases(&text, &DECISION_PATTERNS, MAX_DECISIONS),
        bugs: extract_phrases(&text, &BUG_PATTERNS, MAX_BUGS),
        git_commit_hash,
        git_branch,
        message_count: conversation.len(),
    }
}

fn extract_tags(text: &str) -> Vec<String> {
    TAG_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(tag, _)| (*tag).to_string())
        .take(MAX_TAGS)
        .collect()
}

fn extract_files(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();
    for m in FILE_PATTERN.find_iter(text) {
        let path = m.as_str().trim_matches(|c: char| c == '.' || c == ',');
        if seen.insert(path.to_string()) {
            files.push(path.to_string());
            if files.len() >= MAX_FILES {
                break;
            }
        }
    }
    files
}

/// Scan ordered patterns, keeping trimmed captures.
///
/// Captures longer than the phrase limit are dropped rather than
/// truncated.
fn extract_phrases(text: &str, patterns: &[Regex], max_entries: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut phrases = Vec::new();
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let Some(capture) = caps.get(1) else {
                continue;
            };
            let phrase = capture.as_str().trim();
            if phrase.is_empty() || phrase.chars().count() > MAX_PHRASE_CHARS {
                continue;
            }
            if seen.insert(phrase.to_string()) {
                phrases.push(phrase.to_string());
                if phrases.len() >= max_entries {
                    return phrases;
                }
            }
        }
    }
    phrases
}
