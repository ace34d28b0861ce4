//! Error Types for Bond Advisor

use advisor_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    #[error("Unknown risk profile: {0}")]
    InvalidRiskProfile(String),
}

impl AdvisorError {
    /// One-line notice safe to show the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Agent(e) => e.user_message(),
            Self::MarketData(_) => "Market data is not available right now.".into(),
            Self::InvalidRiskProfile(p) => {
                format!("'{p}' is not a risk profile. Choose conservative, balanced or aggressive.")
            }
        }
    }

    /// Collapse into the core error, e.g. to record a failed turn
    pub fn into_agent_error(self) -> AgentError {
        match self {
            Self::Agent(e) => e,
            other => AgentError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_keeps_generic_notice() {
        let err = AdvisorError::from(AgentError::Transport("HTTP 500".into()));
        assert_eq!(err.user_message(), "The AI advisor went offline. Please try again.");
        assert!(matches!(err.into_agent_error(), AgentError::Transport(_)));
    }

    #[test]
    fn test_domain_errors_collapse_to_other() {
        let err = AdvisorError::MarketData("empty".into());
        assert!(matches!(err.into_agent_error(), AgentError::Other(_)));
    }
}
