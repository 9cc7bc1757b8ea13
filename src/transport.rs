//! Streaming transport
//!
//! One outbound chat request per turn. The transport validates the request,
//! opens the event stream and hands back a [`StreamHandle`] that yields the
//! decoded events in arrival order until the turn ends or is cancelled.

mod error;
mod http;
#[cfg(test)]
pub mod testing;

pub use error::{ChatError, ChatErrorKind, ValidationError};
pub use http::{HealthReport, HttpTransport, ServiceHealth};

use crate::sse::StreamEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// Strip surrounding whitespace, NUL and control characters other than
/// newline and tab.
pub fn sanitize_text(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect();
    kept.trim().to_string()
}

/// Validate and sanitize a message before any network activity.
///
/// Length is counted in characters of the text as typed, before anything is
/// stripped; a message of exactly `max_length` characters is accepted.
pub fn validate_message(text: &str, max_length: usize) -> Result<String, ValidationError> {
    let length = text.chars().count();
    if length > max_length {
        return Err(ValidationError::TooLong {
            length,
            max: max_length,
        });
    }
    let message = sanitize_text(text);
    if message.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(message)
}

/// Sanitize an optional selected-text context, dropping it if nothing remains
pub fn sanitize_context(context: Option<&str>) -> Option<String> {
    context.map(sanitize_text).filter(|text| !text.is_empty())
}

/// Item delivered on a stream: an event, or the error that ended it
pub type StreamItem = Result<StreamEvent, ChatError>;

/// Producer side of a [`StreamHandle`]
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamItem>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Deliver an item unless the stream was cancelled. Returns false once
    /// nothing more should be sent.
    pub fn deliver(&self, item: StreamItem) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer cancels or drops the handle
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Cancelable, ordered sequence of events for one turn
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<StreamItem>,
    cancel: CancellationToken,
    finished: bool,
}

/// Create a connected sink and handle
pub fn stream_channel() -> (EventSink, StreamHandle) {
    let (tx, events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    (
        EventSink {
            tx,
            cancel: cancel.clone(),
        },
        StreamHandle {
            events,
            cancel,
            finished: false,
        },
    )
}

impl StreamHandle {
    /// Next item of the turn.
    ///
    /// Yields every event up to and including `done` or `error`, or a single
    /// `StreamError` if the producer goes away first. Returns `None` once
    /// the turn is over or the handle was cancelled.
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }

        let item = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            item = self.events.recv() => item,
        };

        // An item can race a cancellation issued while we were waiting
        if self.cancel.is_cancelled() {
            return None;
        }

        match item {
            Some(Ok(event)) => {
                self.finished = event.is_terminal();
                Some(Ok(event))
            }
            Some(Err(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            None => {
                self.finished = true;
                Some(Err(ChatError::stream(
                    "The connection closed before the answer was complete",
                )))
            }
        }
    }

    /// Stop reading and suppress all further delivery
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens chat streams
pub trait ChatTransport: Send + Sync {
    /// Validate the request and start streaming the answer.
    ///
    /// Validation failures are returned synchronously and no request is
    /// issued. Connection failures arrive as the first item of the handle.
    fn open(&self, request: ChatRequest) -> Result<StreamHandle, ChatError>;
}

impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    fn open(&self, request: ChatRequest) -> Result<StreamHandle, ChatError> {
        (**self).open(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_length_boundary() {
        let exact = "a".repeat(2000);
        assert_eq!(validate_message(&exact, 2000), Ok(exact.clone()));

        let over = "a".repeat(2001);
        assert_eq!(
            validate_message(&over, 2000),
            Err(ValidationError::TooLong {
                length: 2001,
                max: 2000
            })
        );
    }

    #[test]
    fn test_trailing_whitespace_counts_toward_length() {
        let padded = format!("{} ", "a".repeat(2000));
        assert_eq!(
            validate_message(&padded, 2000),
            Err(ValidationError::TooLong {
                length: 2001,
                max: 2000
            })
        );
    }

    #[test]
    fn test_length_counts_characters() {
        let accented = "é".repeat(2000);
        assert!(validate_message(&accented, 2000).is_ok());
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        assert_eq!(validate_message("", 2000), Err(ValidationError::Empty));
        assert_eq!(validate_message(" \n\t ", 2000), Err(ValidationError::Empty));
        assert_eq!(validate_message("\u{0}", 2000), Err(ValidationError::Empty));
    }

    #[test]
    fn test_sanitize_keeps_newlines_and_tabs() {
        assert_eq!(sanitize_text("  a\u{0}b\u{7}\n\tc  "), "ab\n\tc");
        assert_eq!(sanitize_context(Some("   ")), None);
        assert_eq!(sanitize_context(Some(" picked ")), Some("picked".into()));
    }

    #[test]
    fn test_request_omits_missing_context() {
        let body = serde_json::to_value(ChatRequest::new("Hello", "s-1")).unwrap();
        assert_eq!(body, serde_json::json!({"message": "Hello", "session_id": "s-1"}));

        let body = serde_json::to_value(
            ChatRequest::new("Hello", "s-1").with_context(Some("selected".into())),
        )
        .unwrap();
        assert_eq!(body["context"], "selected");
    }

    #[tokio::test]
    async fn test_handle_ends_after_done() {
        let (sink, mut handle) = stream_channel();
        assert!(sink.deliver(Ok(StreamEvent::Token("Hi".into()))));
        assert!(sink.deliver(Ok(StreamEvent::Done)));
        assert!(sink.deliver(Ok(StreamEvent::Token("late".into()))));

        assert_eq!(handle.next().await, Some(Ok(StreamEvent::Token("Hi".into()))));
        assert_eq!(handle.next().await, Some(Ok(StreamEvent::Done)));
        assert_eq!(handle.next().await, None);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_premature_close_is_a_single_stream_error() {
        let (sink, mut handle) = stream_channel();
        sink.deliver(Ok(StreamEvent::Token("Part".into())));
        drop(sink);

        assert_eq!(handle.next().await, Some(Ok(StreamEvent::Token("Part".into()))));
        let error = handle.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ChatErrorKind::Stream);
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_queued_items() {
        let (sink, mut handle) = stream_channel();
        sink.deliver(Ok(StreamEvent::Token("a".into())));
        sink.deliver(Err(ChatError::stream("reset")));
        handle.cancel();

        assert_eq!(handle.next().await, None);
        assert!(sink.is_cancelled());
        assert!(!sink.deliver(Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_producer() {
        let (sink, handle) = stream_channel();
        drop(handle);
        sink.cancelled().await;
        assert!(!sink.deliver(Ok(StreamEvent::Done)));
    }
}
