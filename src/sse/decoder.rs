//! Incremental event-stream framing
//!
//! Bytes are consumed line by line. Field lines accumulate into the frame
//! under construction and a blank line dispatches it. Anything after the
//! last blank line stays buffered until more bytes arrive.

/// Event kind used when a frame carries no `event:` field
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched block of an event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Frame under construction
#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Option<String>,
    /// Non-comment lines seen, used to tell keep-alives from malformed blocks
    lines: usize,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.lines == 0
    }

    fn push_data(&mut self, value: &str) {
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_string()),
        }
    }
}

/// Stateful decoder for a `text/event-stream` body
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line
    line: Vec<u8>,
    pending: PendingFrame,
    /// The previous byte was `\r`; a following `\n` belongs to the same terminator
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return every frame it completes, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.after_cr = true;
                    self.end_line(&mut frames);
                }
                _ => self.line.push(byte),
            }
        }
        frames
    }

    /// Whether an undelimited fragment is being held back
    pub fn has_pending(&self) -> bool {
        !self.line.is_empty() || !self.pending.is_empty()
    }

    /// Number of buffered bytes not yet part of a complete line
    pub fn buffered_len(&self) -> usize {
        self.line.len()
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        if raw.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        let line = String::from_utf8_lossy(&raw);
        if line.starts_with(':') {
            // Comment, typically a keep-alive ping
            return;
        }

        self.pending.lines += 1;
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.push_data(value),
            "id" | "retry" => {}
            other => {
                tracing::debug!(field = %other, "ignoring unknown event-stream field");
            }
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return None;
        }

        match (pending.event, pending.data) {
            (event, Some(data)) => Some(SseFrame {
                event: event
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
                data,
            }),
            (Some(event), None) if !event.is_empty() => Some(SseFrame {
                event,
                data: String::new(),
            }),
            _ => {
                tracing::warn!(
                    lines = pending.lines,
                    "dropping malformed event block without data"
                );
                None
            }
        }
    }
}
