//! Client error types.

use thiserror::Error;

/// Errors raised while talking to the target cluster.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The target answered with a non-success status.
    #[error("request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] shardshift_proto::Error),
}

impl From<ClientError> for shardshift_core::Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Protocol(e) => shardshift_core::Error::Protocol(e),
            other => shardshift_core::Error::Write(other.to_string()),
        }
    }
}
