//! Server-sent event decoding
//!
//! Turns the raw body of a `text/event-stream` response into discrete
//! [`StreamEvent`]s for the chat transport.

mod decoder;
mod event;

pub use decoder::{SseDecoder, SseFrame};
pub use event::StreamEvent;
