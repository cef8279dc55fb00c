//! Troupe Completion
//!
//! The engine talks to a language model through the [`Completion`] trait. This crate
//! defines that seam together with the message and stream types that cross it,
//! provider settings loading, and [`OpenAiClient`], an implementation for any
//! OpenAI-compatible chat completions endpoint (OpenAI, Ollama, vLLM, ...).

mod completion;
mod error;
mod message;
mod openai;
mod provider;
mod stream;
mod tool;

pub use completion::{AgentProfile, Completion, CompletionRequest};
pub use error::{CompletionError, ProviderError};
pub use message::{Message, MessageRole};
pub use openai::{DEFAULT_MAX_TOOL_TURNS, OpenAiClient};
pub use provider::{ProviderSettings, Providers};
pub use stream::{CompletionStream, Delim, StreamChunk, collect_text};
pub use tool::{Tool, ToolRegistry};
