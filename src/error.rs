//! Error taxonomy for the query surface.
//!
//! Library internals return [`anyhow::Result`]; the request-facing entry points in
//! [`crate::context`] and [`crate::background`] classify failures into a [`ServiceError`]
//! so transports can tell bad input from model failures.

/// A failed request, classified by who is at fault.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was malformed and never reached the embedder.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedding model failed on otherwise valid input.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// The vector index or identifier map could not answer the query.
    #[error("index query failed: {0:#}")]
    Index(anyhow::Error),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// An optional capability is not configured on this server.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    /// `true` when the caller, not the server, should change something.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_cause_chain() {
        let err = ServiceError::Embedding(
            anyhow::anyhow!("shape mismatch").context("vision encoder failed"),
        );
        let msg = err.to_string();
        assert!(msg.contains("vision encoder failed"));
        assert!(msg.contains("shape mismatch"));
    }

    #[test]
    fn only_invalid_input_is_client_error() {
        assert!(ServiceError::InvalidInput("top_k must be >= 1".into()).is_client_error());
        assert!(!ServiceError::Timeout { operation: "text search", secs: 30 }.is_client_error());
    }
}
