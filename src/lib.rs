//! lexibird AI gateway
//!
//! A multi-provider gateway for chat-completion APIs (OpenAI-compatible,
//! Ollama Cloud, Ollama Local) used by the lexibird vocabulary trainer.
//! It normalizes the providers' divergent response envelopes, decodes
//! streamed responses across arbitrary chunk boundaries, degrades from
//! streaming to non-streaming transparently and extracts structured JSON
//! results from free-form model output.

pub mod analysis;
pub mod client;
pub mod error;
pub mod extract;
pub mod message;
pub mod preferences;
pub mod provider;
pub mod templates;

pub use analysis::{SentenceAnalysis, WordAnalysis};
pub use client::{AiClient, ChunkSink, Deadlines, ProgressSink};
pub use error::AiError;
pub use message::{ChatMessage, Role};
pub use preferences::{FilePreferences, MemoryPreferences, Preferences};
pub use provider::{Provider, ProviderConfig};
