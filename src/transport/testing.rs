//! Mock transport for testing
//!
//! Streams are scripted ahead of time; every opened request is recorded.

use super::{
    stream_channel, validate_message, ChatError, ChatRequest, ChatTransport, EventSink,
    StreamHandle, StreamItem,
};
use crate::sse::StreamEvent;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Script {
    /// Deliver the items, then close the stream
    Closed(Vec<StreamItem>),
    /// Deliver the items and keep the stream open for the test to drive
    Open(Vec<StreamItem>),
}

/// Transport returning queued scripted streams
#[allow(dead_code)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Script>>,
    max_message_length: usize,
    /// Sinks of streams queued with [`MockTransport::queue_open_stream`]
    open_sinks: Mutex<VecDeque<EventSink>>,
    /// Record of all requests that reached the "network"
    pub requests: Mutex<Vec<ChatRequest>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            max_message_length: crate::config::DEFAULT_MAX_MESSAGE_LENGTH,
            open_sinks: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream that ends after the given items
    pub fn queue_stream(&self, items: Vec<StreamItem>) {
        self.scripts.lock().unwrap().push_back(Script::Closed(items));
    }

    /// Queue a stream of events that ends after the given events
    pub fn queue_events(&self, events: Vec<StreamEvent>) {
        self.queue_stream(events.into_iter().map(Ok).collect());
    }

    /// Queue a stream that stays open after the given items
    pub fn queue_open_stream(&self, items: Vec<StreamItem>) {
        self.scripts.lock().unwrap().push_back(Script::Open(items));
    }

    /// Take the sink of the oldest open stream to push more items
    pub fn take_sink(&self) -> Option<EventSink> {
        self.open_sinks.lock().unwrap().pop_front()
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTransport for MockTransport {
    fn open(&self, request: ChatRequest) -> Result<StreamHandle, ChatError> {
        validate_message(&request.message, self.max_message_length)?;
        self.requests.lock().unwrap().push(request);

        let (sink, handle) = stream_channel();
        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Closed(items)) => {
                for item in items {
                    sink.deliver(item);
                }
            }
            Some(Script::Open(items)) => {
                for item in items {
                    sink.deliver(item);
                }
                self.open_sinks.lock().unwrap().push_back(sink);
            }
            None => {
                sink.deliver(Err(ChatError::connection(None, "No mock stream queued")));
            }
        }
        Ok(handle)
    }
}
