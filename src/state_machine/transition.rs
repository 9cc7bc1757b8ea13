//! Pure state transition function

use super::{Effect, Event, TurnState, WidgetContext, WidgetModel};
use crate::config::Visibility;
use crate::conversation::{Citation, Conversation, MessageId};
use crate::sse::StreamEvent;
use crate::transport::{sanitize_context, validate_message, ChatError, ChatRequest};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_model: WidgetModel,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(model: WidgetModel) -> Self {
        Self {
            new_model: model,
            effects: vec![],
        }
    }

    /// Keep the current model with no effects
    pub fn unchanged(model: &WidgetModel) -> Self {
        Self::new(model.clone())
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("An answer is still streaming (cancel it first)")]
    TurnInProgress,
}

/// Pure transition function.
///
/// Given the same inputs it always produces the same outputs. All I/O is
/// described by the returned effects.
pub fn transition(
    model: &WidgetModel,
    context: &WidgetContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (model.turn, event) {
        // ============================================================
        // Submission
        // ============================================================
        (TurnState::Idle, Event::Submit { text, selection, at }) => {
            let message = match validate_message(&text, context.max_message_length) {
                Ok(message) => message,
                Err(e) => {
                    let mut next = model.clone();
                    next.error = Some(ChatError::Validation(e));
                    return Ok(TransitionResult::new(next).with_effect(Effect::NotifyError));
                }
            };

            let selection_present = selection.is_some();
            let selected = sanitize_context(selection.as_deref());

            let mut next = model.clone();
            next.conversation.push_user(message.clone(), selected.clone(), at);
            let message_id = next.conversation.push_placeholder(at);
            next.turn = TurnState::Streaming { message_id };
            let had_error = next.error.take().is_some();

            let request =
                ChatRequest::new(message, context.session_id.clone()).with_context(selected);
            let mut result = TransitionResult::new(next)
                .with_effect(Effect::OpenStream {
                    message_id,
                    request,
                })
                .with_effect(Effect::Persist)
                .with_effect(Effect::NotifyConversation);
            if selection_present {
                result = result.with_effect(Effect::ConsumeSelection);
            }
            if had_error {
                result = result.with_effect(Effect::NotifyError);
            }
            Ok(result)
        }

        (TurnState::Streaming { .. }, Event::Submit { .. }) => {
            Err(TransitionError::TurnInProgress)
        }

        // ============================================================
        // Stream events for the active turn
        // ============================================================
        (TurnState::Streaming { message_id }, Event::Stream { message_id: id, event })
            if id == message_id =>
        {
            Ok(apply_stream_event(model, message_id, event))
        }

        (
            TurnState::Streaming { message_id },
            Event::TransportFailed {
                message_id: id,
                error,
            },
        ) if id == message_id =>
        {
            Ok(fail_turn(model, message_id, error))
        }

        // Leftovers of a finished, cancelled or cleared turn
        (_, Event::Stream { message_id, event }) => {
            tracing::debug!(message_id, kind = event.kind(), "Ignoring event for stale turn");
            Ok(TransitionResult::unchanged(model))
        }
        (_, Event::TransportFailed { message_id, error }) => {
            tracing::debug!(message_id, error = %error, "Ignoring failure for stale turn");
            Ok(TransitionResult::unchanged(model))
        }

        // ============================================================
        // Cancellation and clearing
        // ============================================================
        (TurnState::Streaming { message_id }, Event::Cancel) => {
            let mut next = model.clone();
            next.conversation.remove(message_id);
            next.turn = TurnState::Idle;
            Ok(TransitionResult::new(next).with_effects([
                Effect::CancelStream,
                Effect::Persist,
                Effect::NotifyConversation,
            ]))
        }

        (TurnState::Idle, Event::Cancel) => Ok(TransitionResult::unchanged(model)),

        (turn, Event::Clear) => {
            let next = WidgetModel::new(Conversation::new(), model.visibility);
            let mut result = TransitionResult::new(next);
            if turn.is_streaming() {
                result = result.with_effect(Effect::CancelStream);
            }
            result = result.with_effects([Effect::ResetSession, Effect::NotifyConversation]);
            if model.error.is_some() {
                result = result.with_effect(Effect::NotifyError);
            }
            Ok(result)
        }

        // ============================================================
        // Presentation
        // ============================================================
        (_, Event::SetVisibility(visibility)) => Ok(set_visibility(model, visibility)),

        (_, Event::ToggleVisibility) => Ok(set_visibility(model, model.visibility.toggled())),

        (_, Event::DismissError) => {
            if model.error.is_none() {
                return Ok(TransitionResult::unchanged(model));
            }
            let mut next = model.clone();
            next.error = None;
            Ok(TransitionResult::new(next).with_effect(Effect::NotifyError))
        }
    }
}

fn apply_stream_event(
    model: &WidgetModel,
    message_id: MessageId,
    event: StreamEvent,
) -> TransitionResult {
    match event {
        StreamEvent::Token(fragment) => {
            let mut next = model.clone();
            next.conversation.append_token(message_id, &fragment);
            TransitionResult::new(next)
                .with_effects([Effect::Persist, Effect::NotifyConversation])
        }
        StreamEvent::Citation(payload) => match Citation::parse(&payload) {
            Ok(citation) => {
                let mut next = model.clone();
                next.conversation.append_citation(message_id, citation);
                TransitionResult::new(next)
                    .with_effects([Effect::Persist, Effect::NotifyConversation])
            }
            Err(e) => {
                tracing::warn!(message_id, error = %e, "Dropping malformed citation");
                TransitionResult::unchanged(model)
            }
        },
        StreamEvent::Done => {
            let mut next = model.clone();
            next.conversation.finalize(message_id);
            next.turn = TurnState::Idle;
            TransitionResult::new(next)
                .with_effects([Effect::Persist, Effect::NotifyConversation])
        }
        StreamEvent::Error(message) => fail_turn(model, message_id, ChatError::server(message)),
    }
}

/// End the turn with an error. Partial content is kept; an answer that never
/// received anything is removed.
fn fail_turn(model: &WidgetModel, message_id: MessageId, error: ChatError) -> TransitionResult {
    let mut next = model.clone();
    let empty = next
        .conversation
        .get(message_id)
        .is_some_and(|m| m.content.is_empty() && m.citations.is_empty());
    if empty {
        next.conversation.remove(message_id);
    } else {
        next.conversation.finalize(message_id);
    }
    next.turn = TurnState::Idle;
    next.error = Some(error);
    TransitionResult::new(next).with_effects([
        Effect::Persist,
        Effect::NotifyConversation,
        Effect::NotifyError,
    ])
}

fn set_visibility(model: &WidgetModel, visibility: Visibility) -> TransitionResult {
    if model.visibility == visibility {
        return TransitionResult::unchanged(model);
    }
    let mut next = model.clone();
    next.visibility = visibility;
    TransitionResult::new(next).with_effect(Effect::NotifyVisibility)
}
