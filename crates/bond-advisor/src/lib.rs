//! # bond-advisor
//!
//! A bond advisor for individual investors: simulated government bond yields,
//! a pool of bond ETFs, and an LLM that answers questions with that data as
//! context.
//!
//! ## Turn flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SimulatedMarket ──▶ MarketSnapshot ──┐                     │
//! │  instrument pool ─────────────────────┼─▶ system prompt     │
//! │  AdvisorySession.risk_profile ────────┘        │            │
//! │                                                ▼            │
//! │  user message ──▶ open_turn ──▶ LlmProvider stream          │
//! │                                                │            │
//! │  conversation ◀── TurnGuard   ◀── ReplyBuffer ◀┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The prompt never includes earlier turns. Each question is answered
//! against the latest market snapshot only.

pub mod advisor;
pub mod error;
pub mod market;
pub mod model;
pub mod prompt;
pub mod session;
pub mod view;

pub use advisor::{BondAdvisor, PendingTurn, TurnGuard, TurnReport};
pub use error::{AdvisorError, Result};
pub use market::{MarketDataSource, SimulatedMarket};
pub use model::{Instrument, MarketSnapshot, MarketStatus, RiskProfile, RiskTier, YieldPoint};
pub use prompt::{build_system_prompt, GREETING};
pub use session::{AdvisorySession, SessionDelta, SessionEvent, SessionStore};
