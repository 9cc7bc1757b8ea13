//! Widget runtime executor

use super::{WidgetHandle, WidgetUpdate};
use crate::config::ChatConfig;
use crate::conversation::{Conversation, MessageId};
use crate::session::SessionManager;
use crate::state_machine::{transition, Effect, Event, WidgetContext, WidgetModel};
use crate::transport::{ChatTransport, StreamHandle, StreamItem};
use tokio::sync::{broadcast, mpsc};

const INBOX_CAPACITY: usize = 32;
const BROADCAST_CAPACITY: usize = 256;

/// Stream of the turn in progress
struct ActiveStream {
    message_id: MessageId,
    handle: StreamHandle,
}

/// Event loop for one widget
pub struct WidgetRuntime<T: ChatTransport> {
    model: WidgetModel,
    context: WidgetContext,
    transport: T,
    session: SessionManager,
    active: Option<ActiveStream>,
    event_rx: mpsc::Receiver<Event>,
    broadcast_tx: broadcast::Sender<WidgetUpdate>,
}

impl<T: ChatTransport + 'static> WidgetRuntime<T> {
    /// Build a runtime over a restored conversation
    pub fn new(config: &ChatConfig, transport: T, session: SessionManager) -> (Self, WidgetHandle) {
        let conversation: Conversation = session.restore();
        let context = WidgetContext::new(session.session_id(), config.max_message_length);
        let (event_tx, event_rx) = mpsc::channel(INBOX_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let runtime = Self {
            model: WidgetModel::new(conversation, config.initial_visibility),
            context,
            transport,
            session,
            active: None,
            event_rx,
            broadcast_tx: broadcast_tx.clone(),
        };
        let handle = WidgetHandle {
            event_tx,
            broadcast_tx,
        };
        (runtime, handle)
    }

    /// Start the runtime on its own task. The returned receiver already
    /// holds the initial conversation and visibility.
    pub fn spawn(
        config: &ChatConfig,
        transport: T,
        session: SessionManager,
    ) -> (WidgetHandle, broadcast::Receiver<WidgetUpdate>) {
        let (runtime, handle) = Self::new(config, transport, session);
        let updates = handle.subscribe();
        runtime.publish_conversation();
        runtime.publish(WidgetUpdate::Visibility(runtime.model.visibility));
        tokio::spawn(runtime.run());
        (handle, updates)
    }

    pub fn model(&self) -> &WidgetModel {
        &self.model
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting widget runtime");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.process_event(event),
                    None => break,
                },
                Some((message_id, item)) = next_item(&mut self.active) => {
                    self.process_event(stream_event(message_id, item));
                }
            }
        }

        if let Some(active) = self.active.take() {
            active.handle.cancel();
        }
        tracing::info!(session_id = %self.context.session_id, "Widget runtime stopped");
    }

    /// Run one event and everything it triggers through the state machine
    pub fn process_event(&mut self, event: Event) {
        let mut pending = vec![event];

        while let Some(current) = pending.pop() {
            let result = match transition(&self.model, &self.context, current) {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!(error = %e, "Event rejected");
                    self.publish(WidgetUpdate::Rejected(e));
                    continue;
                }
            };
            self.model = result.new_model;

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect) {
                    pending.push(generated);
                }
            }

            // A finished turn no longer needs its stream
            if !self.model.turn.is_streaming() {
                self.active = None;
            }
        }
    }

    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::OpenStream {
                message_id,
                request,
            } => match self.transport.open(request) {
                Ok(handle) => {
                    tracing::debug!(message_id, "Stream opened");
                    self.active = Some(ActiveStream { message_id, handle });
                    None
                }
                Err(error) => Some(Event::TransportFailed { message_id, error }),
            },
            Effect::CancelStream => {
                if let Some(active) = self.active.take() {
                    tracing::info!(message_id = active.message_id, "Cancelling stream");
                    active.handle.cancel();
                }
                None
            }
            Effect::Persist => {
                if let Err(e) = self.session.persist(&self.model.conversation) {
                    tracing::warn!(error = %e, "Failed to persist conversation");
                }
                None
            }
            Effect::ConsumeSelection => {
                self.publish(WidgetUpdate::SelectionConsumed);
                None
            }
            Effect::ResetSession => {
                match self.session.reset() {
                    Ok(session_id) => {
                        self.context.session_id = session_id.to_string();
                        self.publish(WidgetUpdate::SessionChanged {
                            session_id: self.context.session_id.clone(),
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to reset session"),
                }
                None
            }
            Effect::NotifyConversation => {
                self.publish_conversation();
                None
            }
            Effect::NotifyVisibility => {
                self.publish(WidgetUpdate::Visibility(self.model.visibility));
                None
            }
            Effect::NotifyError => {
                if let Some(error) = &self.model.error {
                    tracing::warn!(kind = ?error.kind(), error = %error, "Surfacing error");
                }
                self.publish(WidgetUpdate::Error(self.model.error.clone()));
                None
            }
        }
    }

    fn publish_conversation(&self) {
        self.publish(WidgetUpdate::Conversation {
            messages: self.model.conversation.messages().to_vec(),
            streaming: self.model.turn.is_streaming(),
        });
    }

    fn publish(&self, update: WidgetUpdate) {
        // No subscribers is fine
        let _ = self.broadcast_tx.send(update);
    }
}

/// Next item of the active stream, pending forever when there is none
async fn next_item(active: &mut Option<ActiveStream>) -> Option<(MessageId, StreamItem)> {
    match active {
        Some(stream) => {
            let item = stream.handle.next().await?;
            Some((stream.message_id, item))
        }
        None => std::future::pending().await,
    }
}

fn stream_event(message_id: MessageId, item: StreamItem) -> Event {
    match item {
        Ok(event) => Event::Stream { message_id, event },
        Err(error) => Event::TransportFailed { message_id, error },
    }
}
