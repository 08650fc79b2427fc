//! `text/event-stream` decoding.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines
//! (including split UTF-8 sequences and CRLF pairs) and emits one frame per
//! dispatched event or `retry:` field.

use std::time::Duration;

/// Event name used when the server sends none.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name.
    pub event: String,
    /// Payload; multiple `data:` lines are joined by `\n`.
    pub data: String,
    /// Last event id seen on the stream at dispatch time.
    pub id: Option<String>,
}

impl SseEvent {
    /// An event with no id.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A complete event.
    Event(SseEvent),
    /// The server changed the reconnection delay.
    Retry(Duration),
}

/// Incremental event-stream parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    skip_lf: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl SseDecoder {
    /// Fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The id most recently set by an `id:` field.
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feeds a chunk and returns every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut chunk = chunk;
        if self.skip_lf && !chunk.is_empty() {
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
            self.skip_lf = false;
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buffer.len() {
            let byte = self.buffer[i];
            if byte != b'\n' && byte != b'\r' {
                i += 1;
                continue;
            }

            let line = String::from_utf8_lossy(&self.buffer[start..i]).into_owned();
            let mut next = i + 1;
            if byte == b'\r' {
                match self.buffer.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
            start = next;
            i = next;
        }
        self.buffer.drain(..start);
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_string());
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    return Some(SseFrame::Retry(Duration::from_millis(ms)));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        let data = std::mem::take(&mut self.data);
        Some(SseFrame::Event(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_event_id.clone(),
        }))
    }
}
