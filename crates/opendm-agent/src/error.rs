//! Southbound error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Dialing the device agent failed after the retry budget.
    #[error("connect failed: {0}")]
    ConnectionFailed(String),

    /// The transport broke before or during an exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with an ERROR frame; the message is its
    /// `reason_detail`.
    #[error("{0}")]
    Device(String),

    /// A frame arrived but could not be decoded.
    #[error("stream decode failed: {0}")]
    Stream(String),

    /// The northbound caller went away mid-stream.
    #[error("northbound stream closed")]
    Cancelled,

    #[error("invalid device uri: {0}")]
    InvalidUri(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AgentError::ConnectionFailed(err.to_string())
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        AgentError::InvalidUri(err.to_string())
    }
}
