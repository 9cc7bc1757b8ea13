//! Typed events of the chat stream

use super::SseFrame;
use serde::Deserialize;

/// Message shown when the service reports an error without any text
const UNSPECIFIED_SERVER_ERROR: &str = "The assistant service reported an error";

/// A decoded chat stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text fragment appended verbatim to the answer
    Token(String),
    /// Serialized citation, parsed by the controller
    Citation(String),
    /// End of the answer
    Done,
    /// Error reported by the remote service
    Error(String),
}

/// Token envelope used by the chat service (`{"token": "..."}`)
#[derive(Deserialize)]
struct TokenEnvelope {
    token: String,
}

/// Error envelope used by the chat service (`{"error": "...", "message": "..."}`)
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
    message: Option<String>,
}

impl StreamEvent {
    /// Classify a decoded frame. Unrecognized kinds are logged and skipped.
    pub fn from_frame(frame: SseFrame) -> Option<Self> {
        let SseFrame { event, data } = frame;
        match event.as_str() {
            "token" | "message" => Some(StreamEvent::Token(unwrap_token(data))),
            "citation" => Some(StreamEvent::Citation(data)),
            "done" => Some(StreamEvent::Done),
            "error" => Some(StreamEvent::Error(unwrap_error(data))),
            other => {
                tracing::warn!(kind = %other, "ignoring unrecognized stream event");
                None
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token(_) => "token",
            StreamEvent::Citation(_) => "citation",
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    /// Whether this event ends the turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

fn unwrap_token(data: String) -> String {
    if data.starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<TokenEnvelope>(&data) {
            return envelope.token;
        }
    }
    data
}

fn unwrap_error(data: String) -> String {
    let text = if data.starts_with('{') {
        match serde_json::from_str::<ErrorEnvelope>(&data) {
            Ok(ErrorEnvelope {
                message: Some(message),
                ..
            }) => message,
            Ok(ErrorEnvelope {
                error: Some(error), ..
            }) => error,
            _ => data,
        }
    } else {
        data
    };

    if text.trim().is_empty() {
        UNSPECIFIED_SERVER_ERROR.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(event: &str, data: &str) -> Option<StreamEvent> {
        StreamEvent::from_frame(SseFrame::new(event, data))
    }

    #[test]
    fn test_token_payload_is_verbatim() {
        assert_eq!(classify("token", " Hi "), Some(StreamEvent::Token(" Hi ".into())));
        assert_eq!(classify("message", "x"), Some(StreamEvent::Token("x".into())));
    }

    #[test]
    fn test_token_envelope_is_unwrapped() {
        assert_eq!(
            classify("token", r#"{"token": "kinematics"}"#),
            Some(StreamEvent::Token("kinematics".into()))
        );
        // Not an envelope, kept as text
        assert_eq!(
            classify("token", r#"{"other": 1}"#),
            Some(StreamEvent::Token(r#"{"other": 1}"#.into()))
        );
    }

    #[test]
    fn test_error_payload_variants() {
        assert_eq!(
            classify("error", "rate limited"),
            Some(StreamEvent::Error("rate limited".into()))
        );
        assert_eq!(
            classify("error", r#"{"error": "InternalError", "message": "Please try again."}"#),
            Some(StreamEvent::Error("Please try again.".into()))
        );
        assert_eq!(
            classify("error", r#"{"error": "InternalError"}"#),
            Some(StreamEvent::Error("InternalError".into()))
        );
        assert_eq!(
            classify("error", ""),
            Some(StreamEvent::Error(UNSPECIFIED_SERVER_ERROR.into()))
        );
    }

    #[test]
    fn test_citation_payload_is_left_raw() {
        assert_eq!(
            classify("citation", "{not json"),
            Some(StreamEvent::Citation("{not json".into()))
        );
    }

    #[test]
    fn test_done_ignores_payload() {
        let done = classify("done", r#"{"conversation_id": "c", "message_id": "m"}"#);
        assert_eq!(done, Some(StreamEvent::Done));
        assert!(done.unwrap().is_terminal());
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        assert_eq!(classify("heartbeat", "x"), None);
    }
}
