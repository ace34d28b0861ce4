//! Application State

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;

use bond_advisor::{BondAdvisor, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Market, prompt and provider for every turn
    pub advisor: Arc<BondAdvisor>,

    /// Live advisory sessions, keyed by id
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(advisor: BondAdvisor) -> Self {
        Self {
            advisor: Arc::new(advisor),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

/// Every `every`, drop sessions idle for at least `max_idle`
pub fn spawn_session_sweeper(
    sessions: Arc<SessionStore>,
    max_idle: TimeDelta,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sessions.evict_idle(max_idle) {
                Ok(0) => {}
                Ok(n) => tracing::info!(evicted = n, remaining = sessions.len(), "idle sessions evicted"),
                Err(e) => tracing::warn!("session sweep failed: {}", e),
            }
        }
    })
}
