//! Chat error types

use thiserror::Error;

/// Pre-flight rejection of a message. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    Empty,
    #[error("Message exceeds maximum length of {max} characters (got {length})")]
    TooLong { length: usize, max: usize },
}

/// Errors surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Non-success status or failed handshake. No partial answer exists.
    #[error("{message}")]
    Connection {
        status: Option<u16>,
        message: String,
    },
    /// Body read failure or premature end of the stream
    #[error("{0}")]
    Stream(String),
    /// Explicit `error` event from the service
    #[error("{0}")]
    Server(String),
}

/// Error classification for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    Validation,
    Connection,
    Stream,
    Server,
}

impl ChatError {
    pub fn connection(status: Option<u16>, message: impl Into<String>) -> Self {
        ChatError::Connection {
            status,
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        ChatError::Stream(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        ChatError::Server(message.into())
    }

    pub fn kind(&self) -> ChatErrorKind {
        match self {
            ChatError::Validation(_) => ChatErrorKind::Validation,
            ChatError::Connection { .. } => ChatErrorKind::Connection,
            ChatError::Stream(_) => ChatErrorKind::Stream,
            ChatError::Server(_) => ChatErrorKind::Server,
        }
    }

    /// HTTP status of a rejected request, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Connection { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether resubmitting the same message may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Validation(_) => false,
            ChatError::Connection { status, .. } => {
                !matches!(status, Some(400 | 401 | 403 | 404 | 422))
            }
            ChatError::Stream(_) | ChatError::Server(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = ChatError::from(ValidationError::TooLong {
            length: 2001,
            max: 2000,
        });
        assert_eq!(err.kind(), ChatErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Message exceeds maximum length of 2000 characters (got 2001)"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_connection_classification() {
        let limited = ChatError::connection(Some(429), "Rate limit exceeded");
        assert_eq!(limited.status(), Some(429));
        assert!(limited.is_retryable());

        assert!(!ChatError::connection(Some(422), "bad body").is_retryable());
        assert!(ChatError::connection(None, "connection refused").is_retryable());
    }
}
