#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;

use memchr::memchr;
use serde_json::Value;

use crate::models::StreamEvent;

const DATA_PREFIX: &str = "data: ";

/// Splits an arbitrarily chunked byte stream into complete lines and decodes
/// the `data: {json}` ones into [`StreamEvent`]s.
///
/// Unterminated bytes are carried over to the next chunk as raw bytes, so a
/// UTF-8 sequence split across two chunks decodes the same as if it had
/// arrived whole.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, without the
    /// trailing `\n` (or `\r\n`).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = vec![];
        let mut start = 0;
        while let Some(pos) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + pos;
            let raw = &self.buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(String::from_utf8_lossy(raw).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Feeds `chunk` and decodes the completed lines, skipping the ones that
    /// are not events.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.feed(chunk)
            .iter()
            .filter_map(|line| decode_line(line))
            .collect()
    }

    /// Ends the stream. A trailing fragment without its newline is not a
    /// complete event and is dropped.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            log::trace!(
                "discarding {} unterminated bytes at end of stream",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decodes one line of the wire stream. Lines without the `data: ` prefix,
/// with invalid JSON, or with JSON that is not an object yield `None`.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;

    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(err) => {
            log::trace!("dropping malformed stream line {:?}: {}", line, err);
            return None;
        }
    };
    let object = value.as_object()?;

    let text_field = |key: &str| object.get(key).and_then(Value::as_str);
    let event = match text_field("type") {
        Some("content") => text_field("content").map(StreamEvent::content),
        Some("model_selected") => text_field("model").map(StreamEvent::model_selected),
        _ => None,
    };

    Some(event.unwrap_or(StreamEvent::Unknown))
}
