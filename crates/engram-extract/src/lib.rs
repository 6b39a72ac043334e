mod error;
mod metadata;
mod transcript;
mod vcs;

pub use error::{Error, Result};
pub use metadata::extract_metadata;
pub use transcript::{conversation_from_value, read_transcript};
pub use vcs::probe_git_state;
