//! Incremental SSE decoder.
//!
//! Bytes are buffered across reads so a record split mid-line (or mid UTF-8
//! sequence) is completed on the next `feed`. Records end on a blank line.

use serde_json::{Map, Value};

/// Maximum number of payload characters kept in a decode error.
const EXCERPT_CHARS: usize = 80;

/// One decoded SSE record whose data is a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// The `event:` field, `"message"` when the record has none.
    pub raw_type: String,
    pub payload: Map<String, Value>,
    pub id: Option<String>,
}

impl SseFrame {
    pub const DEFAULT_TYPE: &'static str = "message";

    pub fn new(raw_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            raw_type: raw_type.into(),
            payload,
            id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("invalid JSON in data field ({excerpt}): {source}")]
    InvalidJson {
        excerpt: String,
        source: serde_json::Error,
    },
    #[error("data field is a JSON {found}, expected an object ({excerpt})")]
    NotAnObject { found: &'static str, excerpt: String },
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a record end.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every record completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<SseFrame, DecodeError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some((end, consumed)) = find_record_end(&self.buffer, self.scanned) {
            let record: Vec<u8> = self.buffer.drain(..consumed).take(end).collect();
            self.scanned = 0;
            if let Some(frame) = parse_record(&String::from_utf8_lossy(&record)) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();
        frames
    }

    /// Flush a trailing record left without its blank line at end of stream.
    pub fn finish(&mut self) -> Option<Result<SseFrame, DecodeError>> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            return None;
        }
        parse_record(&text)
    }

    /// Drop any partial record, e.g. before reading from a new connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// End of the first record at or after `from`: the record length and the
/// number of bytes consumed including the blank line. A blank line is an
/// empty line ending in `\n` or `\r\n`, so `\n\n`, `\r\n\r\n` and mixed
/// `\n\r\n` all terminate a record.
fn find_record_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some(offset) = buffer[pos..].iter().position(|b| *b == b'\n') {
        let newline = pos + offset;
        let blank_start = match newline {
            0 => Some(0),
            _ if buffer[newline - 1] == b'\n' => Some(newline),
            1 if buffer[0] == b'\r' => Some(0),
            _ if buffer[newline - 1] == b'\r' && newline >= 2 && buffer[newline - 2] == b'\n' => {
                Some(newline - 1)
            }
            _ => None,
        };
        if let Some(start) = blank_start {
            return Some((start, newline + 1));
        }
        pos = newline + 1;
    }
    None
}

fn parse_record(raw: &str) -> Option<Result<SseFrame, DecodeError>> {
    let mut raw_type = None;
    let mut data_parts: Vec<&str> = Vec::new();
    let mut id = None;

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_parts.push(value),
            "event" => raw_type = Some(value.to_string()),
            "id" => id = Some(value.to_string()),
            _ => {}
        }
    }

    if data_parts.is_empty() {
        return None;
    }
    let data = data_parts.join("\n");
    if data.trim().is_empty() {
        return None;
    }

    Some(parse_payload(&data).map(|payload| SseFrame {
        raw_type: raw_type
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| SseFrame::DEFAULT_TYPE.to_string()),
        payload,
        id,
    }))
}

fn parse_payload(data: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(data).map_err(|source| DecodeError::InvalidJson {
        excerpt: excerpt(data),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            found: json_kind(&other),
            excerpt: excerpt(data),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn excerpt(data: &str) -> String {
    let mut out: String = data.chars().take(EXCERPT_CHARS).collect();
    if data.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}
