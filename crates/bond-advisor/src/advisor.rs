//! Bond advisor orchestration
//!
//! Glues a session turn to the market, the prompt and the provider:
//!
//! ```text
//! Submit ─▶ begin_turn ─▶ system prompt (snapshot + risk + pool)
//!                             │
//!                             ▼
//!                      stream_reply ─▶ deltas ─▶ finish_turn
//! ```

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use advisor_core::{
    collect_reply, reply, AgentError, GenerationOptions, LlmProvider, Message, ReplyBuffer, ReplyStream,
    SessionId, TurnOutcome, TurnTicket,
};

use crate::error::{AdvisorError, Result};
use crate::market::MarketDataSource;
use crate::model::RiskProfile;
use crate::prompt::build_system_prompt;
use crate::session::{SessionDelta, SessionEvent, SessionStore};

/// A turn that has been opened on a session but not yet answered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingTurn {
    pub ticket: TurnTicket,
    pub risk_profile: RiskProfile,
}

/// How a finished turn went, for display
#[derive(Debug)]
pub struct TurnReport {
    /// The assistant message appended to the conversation, if any
    pub reply: Option<Message>,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    /// Visible notice for a failed turn
    pub fn error_notice(&self) -> Option<String> {
        match &self.outcome {
            TurnOutcome::Completed(_) => None,
            TurnOutcome::Failed { error, .. } => Some(error.user_message()),
        }
    }
}

/// Closes an open turn as failed when dropped before [`TurnGuard::finish`].
///
/// A request future cancelled mid-reply must not leave its session waiting
/// for a reply that will never come.
pub struct TurnGuard<'a> {
    advisor: &'a BondAdvisor,
    sessions: &'a SessionStore,
    id: &'a SessionId,
    pending: PendingTurn,
    open: bool,
}

impl TurnGuard<'_> {
    pub fn pending(&self) -> PendingTurn {
        self.pending
    }

    pub fn finish(mut self, outcome: TurnOutcome) -> TurnReport {
        self.open = false;
        self.advisor
            .finish_turn(self.sessions, self.id, self.pending.ticket, outcome)
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        tracing::warn!(session = %self.id, "turn abandoned before the reply finished");
        let outcome = TurnOutcome::Failed {
            partial: String::new(),
            error: AgentError::Transport("request cancelled".into()),
        };
        self.advisor
            .finish_turn(self.sessions, self.id, self.pending.ticket, outcome);
    }
}

pub struct BondAdvisor {
    provider: Arc<dyn LlmProvider>,
    market: Arc<dyn MarketDataSource>,
    options: GenerationOptions,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl BondAdvisor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        market: Arc<dyn MarketDataSource>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            market,
            options,
            today: local_today,
        }
    }

    /// Replace the clock that dates each prompt
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn market(&self) -> &dyn MarketDataSource {
        self.market.as_ref()
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// System prompt for a turn under `risk_profile`: the latest snapshot,
    /// dated the day the question is asked
    pub fn system_prompt(&self, risk_profile: RiskProfile) -> Result<String> {
        let snapshot = self
            .market
            .snapshot()
            .ok_or_else(|| AdvisorError::MarketData("yield series is empty".into()))?;

        Ok(build_system_prompt(
            (self.today)(),
            snapshot.domestic_yield,
            snapshot.foreign_yield,
            risk_profile,
            self.market.instruments(),
        ))
    }

    /// Open the reply stream for one user message
    pub async fn stream_reply(
        &self,
        risk_profile: RiskProfile,
        user_message: &str,
    ) -> Result<ReplyStream> {
        let prompt = self.system_prompt(risk_profile)?;
        let stream =
            reply::stream_reply(self.provider.as_ref(), &self.options, &prompt, user_message).await?;
        Ok(stream)
    }

    /// Append the user message and move the session to awaiting a reply
    pub fn begin_turn(
        &self,
        sessions: &SessionStore,
        id: &SessionId,
        message: &str,
    ) -> Result<PendingTurn> {
        let delta = sessions.update(id, |s| Ok(s.apply(SessionEvent::Submit(message.to_string()))))??;

        match delta {
            SessionDelta::TurnStarted {
                ticket,
                risk_profile,
            } => {
                tracing::info!(session = %id, risk = %risk_profile, "turn started");
                Ok(PendingTurn {
                    ticket,
                    risk_profile,
                })
            }
            other => Err(AgentError::Session(format!("submit produced {other:?}")).into()),
        }
    }

    /// [`Self::begin_turn`], with the turn closed automatically if the caller
    /// never gets to finish it
    pub fn open_turn<'a>(
        &'a self,
        sessions: &'a SessionStore,
        id: &'a SessionId,
        message: &str,
    ) -> Result<TurnGuard<'a>> {
        let pending = self.begin_turn(sessions, id, message)?;
        Ok(TurnGuard {
            advisor: self,
            sessions,
            id,
            pending,
            open: true,
        })
    }

    /// Close a turn. A session deleted in the meantime is not an error.
    pub fn finish_turn(
        &self,
        sessions: &SessionStore,
        id: &SessionId,
        ticket: TurnTicket,
        outcome: TurnOutcome,
    ) -> TurnReport {
        let reply = match sessions.update(id, |s| Ok(s.finish(ticket, &outcome))) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = %id, "could not record reply: {}", e);
                None
            }
        };

        match &outcome {
            TurnOutcome::Completed(text) => {
                tracing::info!(session = %id, chars = text.chars().count(), "turn completed");
            }
            TurnOutcome::Failed { error, .. } => {
                tracing::warn!(session = %id, "turn failed: {}", error);
            }
        }

        TurnReport { reply, outcome }
    }

    /// Run a whole turn, calling `on_update` as deltas arrive.
    ///
    /// Errors only for problems with the session itself (unknown id, a turn
    /// already running, blank message). Provider failures come back as a
    /// failed [`TurnReport`].
    pub async fn chat<F>(
        &self,
        sessions: &SessionStore,
        id: &SessionId,
        message: &str,
        on_update: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(&ReplyBuffer),
    {
        let turn = self.open_turn(sessions, id, message)?;

        let outcome = match self.stream_reply(turn.pending().risk_profile, message).await {
            Ok(stream) => collect_reply(stream, on_update).await,
            Err(e) => TurnOutcome::Failed {
                partial: String::new(),
                error: e.into_agent_error(),
            },
        };

        Ok(turn.finish(outcome))
    }
}
