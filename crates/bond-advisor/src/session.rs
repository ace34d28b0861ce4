//! Advisory sessions and the user actions that drive them.
//!
//! Each user action is one [`SessionEvent`]; applying it yields a
//! [`SessionDelta`] describing what changed. Views are rebuilt from the
//! session afterwards, nothing is re-derived per keystroke.

use advisor_core::{
    session::Keyed, ChatSession, MemorySessionStore, Message, SessionId, TurnOutcome, TurnTicket,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::RiskProfile;
use crate::prompt::GREETING;

/// Store of every live advisory session
pub type SessionStore = MemorySessionStore<AdvisorySession>;

/// One user's chat plus their risk preference
#[derive(Clone, Debug, Serialize)]
pub struct AdvisorySession {
    pub chat: ChatSession,
    pub risk_profile: RiskProfile,
}

/// A user action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SelectRisk(RiskProfile),
    Submit(String),
    Clear,
}

/// What applying an event changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionDelta {
    RiskSelected(RiskProfile),

    /// A user message was appended; the reply must be fetched with this
    /// risk profile and handed back with `ticket`.
    TurnStarted {
        ticket: TurnTicket,
        risk_profile: RiskProfile,
    },

    Cleared,
}

impl AdvisorySession {
    /// New session, seeded with the greeting
    pub fn start() -> Self {
        Self {
            chat: ChatSession::seeded(GREETING),
            risk_profile: RiskProfile::default(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.chat.id
    }

    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionDelta> {
        match event {
            SessionEvent::SelectRisk(profile) => {
                self.risk_profile = profile;
                self.chat.touch();
                Ok(SessionDelta::RiskSelected(profile))
            }
            SessionEvent::Submit(text) => {
                let ticket = self.chat.begin_turn(&text)?;
                Ok(SessionDelta::TurnStarted {
                    ticket,
                    risk_profile: self.risk_profile,
                })
            }
            SessionEvent::Clear => {
                self.chat.clear();
                Ok(SessionDelta::Cleared)
            }
        }
    }

    /// Hand back the result of a turn started by [`SessionEvent::Submit`]
    pub fn finish(&mut self, ticket: TurnTicket, outcome: &TurnOutcome) -> Option<Message> {
        self.chat.finish_turn(ticket, outcome).cloned()
    }
}

impl Default for AdvisorySession {
    fn default() -> Self {
        Self::start()
    }
}

impl Keyed for AdvisorySession {
    fn key(&self) -> &SessionId {
        self.id()
    }

    fn last_active(&self) -> DateTime<Utc> {
        self.chat.updated_at
    }
}
