//! # advisor-runtime
//!
//! Runtime providers for the bond advisor.
//!
//! ## Providers
//!
//! - **Chat completions** (default): any OpenAI-compatible endpoint, DeepSeek
//!   out of the box, streamed over server-sent events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use advisor_runtime::ChatCompletionsProvider;
//!
//! let provider = ChatCompletionsProvider::from_lookup(|name| std::env::var(name).ok())?;
//! let stream = advisor_core::stream_reply(&provider, &options, &prompt, "Is now a good time?").await?;
//! ```

#[cfg(feature = "chat-completions")]
pub mod chat_completions;
pub mod sse;

#[cfg(feature = "chat-completions")]
pub use chat_completions::{ChatCompletionsConfig, ChatCompletionsProvider};

// Re-export core types for convenience
pub use advisor_core::{AgentError, LlmProvider, Message, Result, Role};
