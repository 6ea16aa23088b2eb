//! Transcript archive format: streaming JSONL serialization/deserialization
//!
//! An archived transcript has the structure:
//! ```jsonl
//! {"type":"header","format":"agentdeck-transcript-1","task_id":"...","state":"completed","archived_at":"..."}
//! {"type":"message","envelope":{...},"body":{"kind":"user_message",...}}
//! {"type":"message","envelope":{...},"body":{"kind":"llm_response",...}}
//! {"type":"stats","message_count":2,...}
//! ```
//!
//! The header line carries task metadata (no messages).
//! Each message is one line, in transcript order.
//! The last line is aggregate stats (recomputed on read if missing).

use crate::message::Message;
use crate::stats::TranscriptStats;
use crate::task::TaskState;
use crate::transcript::Transcript;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

pub const ARCHIVE_FORMAT: &str = "agentdeck-transcript-1";

/// A single line in a transcript archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[non_exhaustive]
pub enum ArchiveLine {
    /// First line: task metadata
    #[serde(rename = "header")]
    Header {
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        state: TaskState,
        archived_at: DateTime<Utc>,
    },
    /// Middle lines: one message per line
    #[serde(rename = "message")]
    Message(Message),
    /// Last line: aggregate stats
    #[serde(rename = "stats")]
    Stats(TranscriptStats),
}

/// A transcript read back from an archive.
#[derive(Debug, Clone)]
pub struct TranscriptArchive {
    pub state: TaskState,
    pub archived_at: DateTime<Utc>,
    pub transcript: Transcript,
    pub stats: TranscriptStats,
}

/// Error types for JSONL operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JsonlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Missing header line")]
    MissingHeader,
    #[error("Unexpected line type at line {0}: expected header")]
    UnexpectedLineType(usize),
}

/// Write a transcript archive to a writer
pub fn write_jsonl<W: Write>(
    transcript: &Transcript,
    state: TaskState,
    mut writer: W,
) -> Result<(), JsonlError> {
    let header = ArchiveLine::Header {
        format: ARCHIVE_FORMAT.to_string(),
        task_id: transcript.task_id.clone(),
        state,
        archived_at: Utc::now(),
    };
    serde_json::to_writer(&mut writer, &header)
        .map_err(|e| JsonlError::Json { line: 1, source: e })?;
    writer.write_all(b"\n")?;

    for (i, message) in transcript.messages().iter().enumerate() {
        let line = ArchiveLine::Message(message.clone());
        serde_json::to_writer(&mut writer, &line).map_err(|e| JsonlError::Json {
            line: i + 2,
            source: e,
        })?;
        writer.write_all(b"\n")?;
    }

    let stats_line = ArchiveLine::Stats(TranscriptStats::compute(transcript));
    serde_json::to_writer(&mut writer, &stats_line).map_err(|e| JsonlError::Json {
        line: transcript.len() + 2,
        source: e,
    })?;
    writer.write_all(b"\n")?;

    Ok(())
}

/// Write a transcript archive to a String
pub fn to_jsonl_string(transcript: &Transcript, state: TaskState) -> Result<String, JsonlError> {
    let mut buf = Vec::new();
    write_jsonl(transcript, state, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read a transcript archive from a reader
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<TranscriptArchive, JsonlError> {
    let mut lines = reader.lines();

    let header_str = lines.next().ok_or(JsonlError::MissingHeader)??;
    let header: ArchiveLine =
        serde_json::from_str(&header_str).map_err(|e| JsonlError::Json { line: 1, source: e })?;

    let (task_id, state, archived_at) = match header {
        ArchiveLine::Header {
            task_id,
            state,
            archived_at,
            ..
        } => (task_id, state, archived_at),
        _ => return Err(JsonlError::UnexpectedLineType(1)),
    };

    let mut transcript = Transcript {
        task_id,
        frozen: true,
        ..Transcript::default()
    };
    let mut stats = None;
    let mut line_num = 1usize;

    for line_result in lines {
        line_num += 1;
        let line_str = line_result?;
        if line_str.trim().is_empty() {
            continue;
        }

        let archive_line: ArchiveLine =
            serde_json::from_str(&line_str).map_err(|e| JsonlError::Json {
                line: line_num,
                source: e,
            })?;

        match archive_line {
            ArchiveLine::Message(message) => transcript.messages.push(message),
            ArchiveLine::Stats(s) => stats = Some(s),
            ArchiveLine::Header { .. } => {
                // Ignore duplicate headers
            }
        }
    }

    let stats = stats.unwrap_or_else(|| TranscriptStats::compute(&transcript));
    Ok(TranscriptArchive {
        state,
        archived_at,
        transcript,
        stats,
    })
}

/// Read a transcript archive from a string
pub fn from_jsonl_str(s: &str) -> Result<TranscriptArchive, JsonlError> {
    read_jsonl(io::BufReader::new(s.as_bytes()))
}
