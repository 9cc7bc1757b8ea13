//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary stream contents.

use super::*;
use crate::sse::StreamEvent;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> WidgetContext {
    WidgetContext::new("prop-session", 2000)
}

fn submit(text: &str) -> Event {
    Event::Submit {
        text: text.to_string(),
        selection: None,
        at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn apply(model: WidgetModel, event: Event) -> WidgetModel {
    match transition(&model, &test_context(), event) {
        Ok(result) => result.new_model,
        Err(_) => model,
    }
}

fn citation_payload(id: &str) -> String {
    serde_json::json!({
        "id": id,
        "chapter": "Chapter",
        "section": "Section",
        "locator": format!("/docs/{id}"),
    })
    .to_string()
}

fn assert_single_in_flight(model: &WidgetModel) {
    let streaming: Vec<_> = model
        .conversation
        .messages()
        .iter()
        .filter(|m| m.streaming)
        .collect();
    assert!(streaming.len() <= 1, "more than one in-flight message");
    assert!(streaming.iter().all(|m| !m.is_user()), "user message flagged streaming");
    match model.turn {
        TurnState::Idle => assert!(streaming.is_empty()),
        TurnState::Streaming { message_id } => {
            assert_eq!(streaming.first().map(|m| m.id), Some(message_id));
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Token(String),
    /// Valid citation with the given id, or a malformed payload
    Citation(Option<String>),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => ".{0,12}".prop_map(Step::Token),
        1 => proptest::option::of("[a-z0-9]{1,6}").prop_map(Step::Citation),
    ]
}

/// Any event a user or the stream can produce, addressed at the given turn
fn arb_event(message_id: u64) -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z ]{0,20}".prop_map(|text| submit(&text)),
        Just(Event::Cancel),
        Just(Event::ToggleVisibility),
        Just(Event::DismissError),
        ".{0,8}".prop_map(move |t| Event::Stream {
            message_id,
            event: StreamEvent::Token(t),
        }),
        Just(Event::Stream {
            message_id,
            event: StreamEvent::Done,
        }),
        "[a-z ]{0,10}".prop_map(move |e| Event::Stream {
            message_id,
            event: StreamEvent::Error(e),
        }),
        Just(Event::TransportFailed {
            message_id,
            error: crate::transport::ChatError::stream("reset"),
        }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Final answer text is the concatenation of all token payloads
    #[test]
    fn prop_tokens_concatenate(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let model = apply(WidgetModel::default(), submit("question"));
        let id = model.turn.active_message().unwrap();

        let mut expected_text = String::new();
        let mut expected_citations = Vec::new();
        let mut model = model;
        for step in steps {
            let event = match step {
                Step::Token(t) => {
                    expected_text.push_str(&t);
                    StreamEvent::Token(t)
                }
                Step::Citation(Some(cid)) => {
                    expected_citations.push(cid.clone());
                    StreamEvent::Citation(citation_payload(&cid))
                }
                Step::Citation(None) => StreamEvent::Citation("{\"id\":".to_string()),
            };
            model = apply(model, Event::Stream { message_id: id, event });
            assert_single_in_flight(&model);
        }
        model = apply(model, Event::Stream { message_id: id, event: StreamEvent::Done });

        let answer = model.conversation.get(id).unwrap();
        prop_assert_eq!(&answer.content, &expected_text);
        let ids: Vec<String> = answer.citations.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(ids, expected_citations);
        prop_assert!(!answer.streaming);
    }

    /// Messages appear in creation order with strictly increasing ids, and at
    /// most one message is ever in flight
    #[test]
    fn prop_invariants_hold_for_any_sequence(
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..40),
        events in proptest::collection::vec(arb_event(0), 0..40),
    ) {
        let mut model = WidgetModel::default();
        for (pick, event) in picks.into_iter().zip(events) {
            // Address stream events at a real message most of the time
            let target = if model.conversation.is_empty() {
                0
            } else {
                model.conversation.messages()[pick.index(model.conversation.len())].id
            };
            let event = match event {
                Event::Stream { event, .. } => Event::Stream { message_id: target, event },
                Event::TransportFailed { error, .. } => {
                    Event::TransportFailed { message_id: target, error }
                }
                other => other,
            };

            let before = model.conversation.clone();
            model = apply(model, event);
            assert_single_in_flight(&model);

            let messages = model.conversation.messages();
            prop_assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
            prop_assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));

            // Finalized messages are immutable
            for old in before.messages().iter().filter(|m| !m.streaming) {
                if let Some(now) = model.conversation.get(old.id) {
                    prop_assert_eq!(now, old);
                }
            }
        }
    }

    /// A turn always ends idle, whatever terminal event ends it
    #[test]
    fn prop_terminal_events_return_to_idle(
        tokens in proptest::collection::vec(".{0,6}", 0..5),
        terminal in 0u8..4,
    ) {
        let mut model = apply(WidgetModel::default(), submit("question"));
        let id = model.turn.active_message().unwrap();
        for t in tokens {
            model = apply(model, Event::Stream { message_id: id, event: StreamEvent::Token(t) });
        }
        let end = match terminal {
            0 => Event::Stream { message_id: id, event: StreamEvent::Done },
            1 => Event::Stream { message_id: id, event: StreamEvent::Error("boom".into()) },
            2 => Event::TransportFailed {
                message_id: id,
                error: crate::transport::ChatError::stream("eof"),
            },
            _ => Event::Cancel,
        };
        model = apply(model, end);
        prop_assert_eq!(model.turn, TurnState::Idle);
        prop_assert!(model.conversation.in_flight().is_none());
    }
}
