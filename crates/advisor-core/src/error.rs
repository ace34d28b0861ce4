//! Error Types

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Only configuration problems are fatal. Every other failure that reaches the
/// user collapses into the single notice returned by [`AgentError::user_message`].
#[derive(Error, Debug)]
pub enum AgentError {
    /// Network, HTTP status or stream failure talking to the LLM endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session transition
    #[error("Session error: {0}")]
    Session(String),

    /// Rejected user input, e.g. a blank message
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown session
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("The advisor is not configured: {msg}"),
            Self::Session(msg) => format!("Cannot do that right now: {msg}"),
            Self::InvalidInput(msg) => format!("Cannot send that: {msg}"),
            Self::NotFound(_) => "This conversation no longer exists. Please start a new one.".into(),
            _ => "The AI advisor went offline. Please try again.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_share_one_notice() {
        let a = AgentError::Transport("connection reset".into());
        let b = AgentError::Other("bad frame".into());
        assert_eq!(a.user_message(), b.user_message());
    }

    #[test]
    fn test_config_message_names_problem() {
        let err = AgentError::Config("DEEPSEEK_API_KEY is not set".into());
        assert!(err.user_message().contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_invalid_input_is_not_an_outage() {
        let err = AgentError::InvalidInput("message is empty".into());
        assert_eq!(err.user_message(), "Cannot send that: message is empty");
    }
}
