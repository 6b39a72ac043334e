use serde::{Deserialize, Serialize};

/// Maximum number of tags kept per snapshot.
pub const MAX_TAGS: usize = 10;
/// Maximum number of mentioned files kept per snapshot.
pub const MAX_FILES: usize = 50;
/// Maximum number of key decisions kept per snapshot.
pub const MAX_DECISIONS: usize = 10;
/// Maximum number of fixed bugs kept per snapshot.
pub const MAX_BUGS: usize = 10;
/// Decision/bug captures longer than this are dropped outright.
pub const MAX_PHRASE_CHARS: usize = 200;

/// Metadata derived from a conversation's message text.
///
/// Every field is best-effort: extraction failures leave the arrays
/// empty rather than failing the capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub tags: Vec<String>,
    pub files: Vec<String>,
    pub decisions: Vec<String>,
    pub bugs: Vec<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
    pub message_count: usize,
}

impl SessionMetadata {
    pub fn empty_with_count(message_count: usize) -> Self {
        Self {
            message_count,
            ..Self::default()
        }
    }
}
