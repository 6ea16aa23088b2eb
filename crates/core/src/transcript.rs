use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered messages for one task.
///
/// Insertion order is never changed. Only the reducer in `agentdeck-stream`
/// writes to a transcript; everything else reads it through the accessors
/// below or through a shared snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Transcript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Chunk stream ids finalized via `is_final`; later chunks with these ids
    /// are rejected.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sealed_stream_ids: BTreeSet<String>,
    /// Set once the task is replaced; a frozen transcript accepts no messages.
    #[serde(default)]
    pub frozen: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The trailing entry when it is a streaming chunk still accumulating.
    pub fn open_chunk(&self) -> Option<&Message> {
        self.messages.last().filter(|message| message.is_open_chunk())
    }

    pub fn open_chunk_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.is_open_chunk())
            .count()
    }

    pub fn is_sealed(&self, stream_id: &str) -> bool {
        self.sealed_stream_ids.contains(stream_id)
    }
}
