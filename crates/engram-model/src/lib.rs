mod client;
mod embedder;
mod error;
mod summarizer;

pub use client::OllamaClient;
pub use embedder::{synthetic_vector, Embedder, EmbedderConfig, Embedding};
pub use error::{Error, Result};
pub use summarizer::{
    extractive_summary, SelectionStrategy, SessionInfo, Summarizer, SummarizerConfig, Summary,
};
