//! Widget state types

use crate::config::{Visibility, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::conversation::{Conversation, MessageId};
use crate::transport::ChatError;

/// Turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Ready for input
    #[default]
    Idle,
    /// Answer for the given assistant message is streaming in
    Streaming { message_id: MessageId },
}

impl TurnState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, TurnState::Streaming { .. })
    }

    /// Message receiving tokens in the current turn
    pub fn active_message(&self) -> Option<MessageId> {
        match self {
            TurnState::Streaming { message_id } => Some(*message_id),
            TurnState::Idle => None,
        }
    }
}

/// Everything the widget renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetModel {
    pub turn: TurnState,
    pub conversation: Conversation,
    pub visibility: Visibility,
    /// Last surfaced error, kept until the next accepted submit or a dismiss
    pub error: Option<ChatError>,
}

impl WidgetModel {
    pub fn new(conversation: Conversation, visibility: Visibility) -> Self {
        Self {
            turn: TurnState::Idle,
            conversation,
            visibility,
            error: None,
        }
    }
}

/// Inputs to transitions that the state machine does not own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetContext {
    pub session_id: String,
    pub max_message_length: usize,
}

impl WidgetContext {
    pub fn new(session_id: impl Into<String>, max_message_length: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_message_length,
        }
    }
}

impl Default for WidgetContext {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_MAX_MESSAGE_LENGTH)
    }
}
