//! Incremental decoder for `text/event-stream` bodies

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the server named the event
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// Whether an EventSource would deliver this to its `onmessage` handler
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("" | "message"))
    }
}

/// Splits a byte stream into events. Chunks may break anywhere, including
/// inside a UTF-8 sequence or between `\r` and `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    // a chunk ended on '\r'; a leading '\n' in the next chunk belongs to it
    pending_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        let mut bytes = chunk;

        if self.pending_cr {
            self.pending_cr = false;
            if let Some(rest) = bytes.strip_prefix(b"\n") {
                bytes = rest;
            }
        }

        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    self.buffer.extend_from_slice(&bytes[start..i]);
                    self.take_line(&mut events);
                    start = i + 1;
                }
                b'\r' => {
                    self.buffer.extend_from_slice(&bytes[start..i]);
                    self.take_line(&mut events);
                    if i + 1 == bytes.len() {
                        self.pending_cr = true;
                    } else if bytes[i + 1] == b'\n' {
                        i += 1;
                    }
                    start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        self.buffer.extend_from_slice(&bytes[start..]);

        events
    }

    fn take_line(&mut self, events: &mut Vec<SseEvent>) {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" if value.is_empty() => self.event = None,
            "event" => self.event = Some(value.to_string()),
            "id" | "retry" => {}
            other => tracing::trace!("Ignoring unknown SSE field '{}'", other),
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        if data.is_empty() {
            return None;
        }
        Some(SseEvent { event, data })
    }
}
