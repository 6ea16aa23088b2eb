use crate::message::Message;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

/// Everything shown in one chat view: an optional welcome line followed by
/// one transcript per submitted task, oldest first.
///
/// Only the last segment is writable. Earlier segments stay visible but are
/// frozen when the next task begins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome: Option<Message>,
    #[serde(default)]
    pub segments: Vec<Transcript>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_welcome(welcome: Message) -> Self {
        Self {
            welcome: Some(welcome),
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[Transcript] {
        &self.segments
    }

    pub fn current(&self) -> Option<&Transcript> {
        self.segments.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Transcript> {
        self.segments.last_mut()
    }

    /// Push a fresh segment. The caller is responsible for finalizing the
    /// previous segment before it is frozen here.
    pub fn push_segment(&mut self, segment: Transcript) {
        if let Some(previous) = self.segments.last_mut() {
            previous.frozen = true;
        }
        self.segments.push(segment);
    }

    /// Start a segment for a new task, opened by the user's prompt.
    pub fn begin_task(&mut self, prompt: Message) {
        let mut segment = Transcript::new();
        segment.messages.push(prompt);
        self.push_segment(segment);
    }

    /// Total number of visible messages, welcome included.
    pub fn message_count(&self) -> usize {
        usize::from(self.welcome.is_some())
            + self
                .segments
                .iter()
                .map(Transcript::len)
                .sum::<usize>()
    }

    /// All messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.welcome
            .iter()
            .chain(self.segments.iter().flat_map(|segment| segment.messages.iter()))
    }
}
