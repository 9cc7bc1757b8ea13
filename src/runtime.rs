//! Runtime for the widget controller
//!
//! Owns the model, feeds user and stream events through the state machine
//! and publishes every visible change on a broadcast channel.

mod executor;

pub use executor::WidgetRuntime;

use crate::config::Visibility;
use crate::conversation::Message;
use crate::state_machine::{Event, TransitionError};
use crate::transport::ChatError;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Changes published to the rendering layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetUpdate {
    /// Snapshot of the conversation after a mutation
    Conversation {
        messages: Vec<Message>,
        streaming: bool,
    },
    Visibility(Visibility),
    /// Current error banner, `None` once dismissed or superseded
    Error(Option<ChatError>),
    /// The selected text was sent and can be cleared on the page
    SelectionConsumed,
    SessionChanged {
        session_id: String,
    },
    /// A user action was refused and nothing changed
    Rejected(TransitionError),
}

#[derive(Debug, Error)]
#[error("Widget runtime has stopped")]
pub struct WidgetClosed;

/// Handle to interact with a running widget
#[derive(Debug, Clone)]
pub struct WidgetHandle {
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<WidgetUpdate>,
}

impl WidgetHandle {
    pub async fn send(&self, event: Event) -> Result<(), WidgetClosed> {
        self.event_tx.send(event).await.map_err(|_| WidgetClosed)
    }

    /// Ask a question, optionally about a selected piece of text
    pub async fn submit(
        &self,
        text: impl Into<String>,
        selection: Option<String>,
    ) -> Result<(), WidgetClosed> {
        self.send(Event::submit(text, selection)).await
    }

    pub async fn cancel(&self) -> Result<(), WidgetClosed> {
        self.send(Event::Cancel).await
    }

    pub async fn clear(&self) -> Result<(), WidgetClosed> {
        self.send(Event::Clear).await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), WidgetClosed> {
        self.send(Event::SetVisibility(visibility)).await
    }

    pub async fn toggle(&self) -> Result<(), WidgetClosed> {
        self.send(Event::ToggleVisibility).await
    }

    pub async fn dismiss_error(&self) -> Result<(), WidgetClosed> {
        self.send(Event::DismissError).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetUpdate> {
        self.broadcast_tx.subscribe()
    }
}
