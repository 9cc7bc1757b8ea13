//! Effects produced by state transitions

use crate::conversation::MessageId;
use crate::transport::ChatRequest;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the transport for a new turn
    OpenStream {
        message_id: MessageId,
        request: ChatRequest,
    },

    /// Cancel the active transport
    CancelStream,

    /// Save the conversation
    Persist,

    /// Tell the page the selected text was used
    ConsumeSelection,

    /// Drop the persisted conversation and mint a new session id
    ResetSession,

    // Rendering notifications
    NotifyConversation,
    NotifyVisibility,
    NotifyError,
}
