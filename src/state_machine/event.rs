//! Events that drive the widget

use crate::config::Visibility;
use crate::conversation::MessageId;
use crate::sse::StreamEvent;
use crate::transport::ChatError;
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    Submit {
        text: String,
        /// Text the reader had selected on the page, if any
        selection: Option<String>,
        at: DateTime<Utc>,
    },
    Cancel,
    Clear,
    SetVisibility(Visibility),
    ToggleVisibility,
    DismissError,

    // Stream events, tagged with the assistant message of their turn
    Stream {
        message_id: MessageId,
        event: StreamEvent,
    },
    TransportFailed {
        message_id: MessageId,
        error: ChatError,
    },
}

impl Event {
    pub fn submit(text: impl Into<String>, selection: Option<String>) -> Self {
        Event::Submit {
            text: text.into(),
            selection,
            at: Utc::now(),
        }
    }
}
