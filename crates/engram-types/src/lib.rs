mod agent;
mod capture;
mod conversation;
mod metadata;
mod util;

pub use agent::{canonical_json, AgentDefinitionSpec, AgentWorkRecord};
pub use capture::{AgentCaptureRequest, CaptureRequest, PriorSession, SnapshotRecord};
pub use conversation::{Conversation, Message, Role};
pub use metadata::{
    SessionMetadata, MAX_BUGS, MAX_DECISIONS, MAX_FILES, MAX_PHRASE_CHARS, MAX_TAGS,
};
pub use util::clip_chars;

/// Dimension of every stored embedding vector.
pub const EMBEDDING_DIM: usize = 384;
