//! Session Management
//!
//! A chat session is an append-only conversation plus a small state machine:
//!
//! ```text
//! Empty ──start──▶ Seeded ──submit──▶ AwaitingReply ──finish──▶ Idle
//!   ▲                                     ▲                       │
//!   └──────────── clear (any state) ──────┴───────── submit ──────┘
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::reply::TurnOutcome;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session is in its turn cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    Seeded,
    AwaitingReply,
    Idle,
}

/// Proof that a turn was started. Only the latest ticket can finish a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnTicket(u64);

/// One user's conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique identifier
    pub id: SessionId,

    conversation: Conversation,

    state: SessionState,

    /// Bumped on every begin and clear; stale tickets fail to match
    #[serde(skip)]
    generation: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create an empty session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::new(),
            state: SessionState::Empty,
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a session seeded with one assistant greeting
    pub fn seeded(greeting: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.conversation.push(Message::assistant(greeting));
        session.state = SessionState::Seeded;
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append the user's message and wait for a reply.
    pub fn begin_turn(&mut self, text: &str) -> Result<TurnTicket> {
        if self.state == SessionState::AwaitingReply {
            return Err(AgentError::Session("a reply is already in progress".into()));
        }
        if text.trim().is_empty() {
            return Err(AgentError::InvalidInput("message is empty".into()));
        }

        self.conversation.push(Message::user(text));
        self.state = SessionState::AwaitingReply;
        self.generation += 1;
        self.touch();
        Ok(TurnTicket(self.generation))
    }

    /// Close the turn opened by `ticket`.
    ///
    /// A completed reply is appended as one assistant message. A failed
    /// reply appends nothing; partial text is dropped. Returns the appended
    /// message, or `None` when nothing was appended (failure, or the ticket
    /// went stale because the history was cleared meanwhile).
    pub fn finish_turn(&mut self, ticket: TurnTicket, outcome: &TurnOutcome) -> Option<&Message> {
        if ticket.0 != self.generation || self.state != SessionState::AwaitingReply {
            tracing::debug!(session = %self.id, "dropping reply for stale turn");
            return None;
        }

        self.state = SessionState::Idle;
        self.touch();

        match outcome {
            TurnOutcome::Completed(text) => {
                self.conversation.push(Message::assistant(text.clone()));
                self.conversation.last()
            }
            TurnOutcome::Failed { partial, error } => {
                tracing::info!(
                    session = %self.id,
                    discarded = partial.len(),
                    "turn failed: {}",
                    error
                );
                None
            }
        }
    }

    /// Drop the whole history. The greeting is not re-added.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.state = SessionState::Empty;
        self.generation += 1;
        self.touch();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything kept in a [`MemorySessionStore`]
pub trait Keyed {
    fn key(&self) -> &SessionId;

    /// Last time the owner did anything with it
    fn last_active(&self) -> DateTime<Utc>;
}

impl Keyed for ChatSession {
    fn key(&self) -> &SessionId {
        &self.id
    }

    fn last_active(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// In-memory session store
///
/// Locks are held only for the duration of one closure; never across an await.
pub struct MemorySessionStore<S> {
    sessions: RwLock<HashMap<SessionId, S>>,
}

impl<S> Default for MemorySessionStore<S> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: Keyed + Clone> MemorySessionStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a session, replacing any with the same id
    pub fn insert(&self, session: S) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.key().clone(), session);
        Ok(())
    }

    /// Snapshot of a session
    pub fn get(&self, id: &SessionId) -> Result<S> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("session {id}")))
    }

    /// Run `f` against a session under the write lock
    pub fn update<T, F>(&self, id: &SessionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> Result<T>,
    {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::NotFound(format!("session {id}")))?;
        f(session)
    }

    /// Delete a session
    pub fn remove(&self, id: &SessionId) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(id).is_some())
    }

    /// Drop every session untouched for at least `max_idle`; returns how many went
    pub fn evict_idle(&self, max_idle: TimeDelta) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_active() < max_idle);
        Ok(before - sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AgentError {
    AgentError::Session("session store lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn test_seeded_session() {
        let session = ChatSession::seeded("Hello!");
        assert_eq!(session.state(), SessionState::Seeded);
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.messages()[0].role, Role::Assistant);
    }

    #[test]
    fn test_full_turn_appends_user_then_assistant() {
        let mut session = ChatSession::seeded("Hello!");
        let ticket = session.begin_turn("x").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingReply);

        let appended = session
            .finish_turn(ticket, &TurnOutcome::Completed("full text".into()))
            .cloned();
        assert!(appended.is_some());
        assert_eq!(session.state(), SessionState::Idle);

        let tail: Vec<_> = session.messages()[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(tail, vec![(Role::User, "x"), (Role::Assistant, "full text")]);
    }

    #[test]
    fn test_failed_turn_discards_partial_text() {
        let mut session = ChatSession::seeded("Hello!");
        let ticket = session.begin_turn("x").unwrap();
        let outcome = TurnOutcome::Failed {
            partial: "Hello ".into(),
            error: AgentError::Transport("reset".into()),
        };

        assert!(session.finish_turn(ticket, &outcome).is_none());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.messages().last().unwrap().role, Role::User);
    }

    #[test]
    fn test_second_submit_rejected_while_waiting() {
        let mut session = ChatSession::seeded("Hello!");
        session.begin_turn("first").unwrap();
        let err = session.begin_turn("second").unwrap_err();
        assert!(matches!(err, AgentError::Session(_)));
        assert_eq!(session.message_count(), 2);
    }

    #[test]
    fn test_blank_submit_rejected() {
        let mut session = ChatSession::seeded("Hello!");
        let err = session.begin_turn("   ").unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
        assert_eq!(session.state(), SessionState::Seeded);
    }

    #[test]
    fn test_clear_empties_without_reseed() {
        let mut session = ChatSession::seeded("Hello!");
        let ticket = session.begin_turn("x").unwrap();
        session.finish_turn(ticket, &TurnOutcome::Completed("y".into()));

        session.clear();
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_reply_after_clear_is_dropped() {
        let mut session = ChatSession::seeded("Hello!");
        let ticket = session.begin_turn("x").unwrap();
        session.clear();

        assert!(session
            .finish_turn(ticket, &TurnOutcome::Completed("late".into()))
            .is_none());
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_chat_after_clear() {
        let mut session = ChatSession::seeded("Hello!");
        session.clear();
        let ticket = session.begin_turn("again").unwrap();
        session.finish_turn(ticket, &TurnOutcome::Completed("sure".into()));
        assert_eq!(session.message_count(), 2);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        let session = ChatSession::seeded("Hello!");
        let id = session.id.clone();

        store.insert(session).unwrap();
        store.update(&id, |s| s.begin_turn("hi").map(|_| ())).unwrap();

        let loaded = store.get(&id).unwrap();
        assert_eq!(loaded.message_count(), 2);

        assert!(store.remove(&id).unwrap());
        assert!(matches!(store.get(&id), Err(AgentError::NotFound(_))));
    }

    #[test]
    fn test_evict_idle_keeps_recent_sessions() {
        let store = MemorySessionStore::new();
        store.insert(ChatSession::seeded("Hello!")).unwrap();
        store.insert(ChatSession::seeded("Hello!")).unwrap();

        assert_eq!(store.evict_idle(TimeDelta::hours(1)).unwrap(), 0);
        assert_eq!(store.len(), 2);

        assert_eq!(store.evict_idle(TimeDelta::zero()).unwrap(), 2);
        assert!(store.is_empty());
    }
}
