//! # advisor-core
//!
//! Provider-agnostic chat plumbing for the bond advisor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ChatSession (state machine + append-only Conversation)      │
//! │        │ begin_turn / finish_turn                            │
//! │        ▼                                                     │
//! │  reply::stream_reply ──▶ LlmProvider (Strategy) ──▶ deltas   │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  ReplyBuffer (accumulation + cursor) ──▶ TurnOutcome         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod message;
pub mod provider;
pub mod reply;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{GenerationOptions, LlmProvider};
pub use reply::{collect_reply, stream_reply, ReplyBuffer, ReplyStream, TurnOutcome};
pub use session::{ChatSession, MemorySessionStore, SessionId, SessionState, TurnTicket};
