use std::convert::Infallible;
use std::fmt::Display;

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value as J;

/// Wrap one payload as a `text/event-stream` holding a single `message` event.
pub fn single_message<T: Serialize>(payload: &T) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    let event = Event::default().event("message").data(json);
    Sse::new(stream::once(async move { Ok(event) }))
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|v| v.eq_ignore_ascii_case("text/event-stream"))
}

/// Splits raw bytes into SSE events and returns each event's `data`, with
/// multi-line data joined by `\n`. Events without data are dropped.
#[derive(Default)]
pub struct SseEventDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseEventDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;
        while let Some(rel) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + rel;
            let end = if newline > start && self.buffer[newline - 1] == b'\r' { newline - 1 } else { newline };
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            self.line(&line, &mut events);
            start = newline + 1;
        }
        self.buffer.drain(..start);
        events
    }

    /// Flush a trailing event the stream did not terminate with a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.line(&line, &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_owned());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

/// The payload answers request `id` when it echoes the id and carries a
/// result or an error. Notifications and other replies do not.
fn answers(payload: &J, id: &J) -> bool {
    payload.get("id") == Some(id) && (payload.get("result").is_some() || payload.get("error").is_some())
}

/// Read an event stream until the JSON-RPC response for `id` arrives.
pub async fn first_response<S, B, E>(stream: S, id: &J) -> Result<J, String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseEventDecoder::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("event stream failed: {e}"))?;
        if let Some(found) = pick(decoder.push(chunk.as_ref()), id) {
            return Ok(found);
        }
    }
    pick(decoder.finish(), id).ok_or_else(|| "event stream ended without a response".to_owned())
}

fn pick(events: Vec<String>, id: &J) -> Option<J> {
    events.into_iter().find_map(|data| match serde_json::from_str::<J>(&data) {
        Ok(payload) if answers(&payload, id) => Some(payload),
        Ok(_) => {
            tracing::debug!("skipping event that does not answer the request");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping non-JSON event");
            None
        }
    })
}
