//! One conversation's synchronous pipeline:
//! decoder → classifier → lifecycle → mapper → reducer.
//!
//! The conversation sits behind an `Arc` and is updated copy-on-write, so a
//! snapshot handed out earlier never changes underneath its reader.

use agentdeck_core::{Conversation, Message, TaskState, TaskStatus, Transcript};
use std::sync::Arc;
use tracing::{info, warn};

use crate::classify::VisibilityPolicy;
use crate::decode::{DecodeError, SseDecoder, SseFrame};
use crate::lifecycle::{TaskCreatedHook, TaskLifecycle};
use crate::map::map_event;
use crate::reduce;

/// Everything a consumer may read: the conversation and the task status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub conversation: Arc<Conversation>,
    pub status: TaskStatus,
}

/// Counters for one `ingest` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Frames decoded successfully.
    pub frames: usize,
    /// Messages applied to the transcript.
    pub applied: usize,
    /// Frames that produced no transcript change.
    pub skipped: usize,
    pub decode_errors: usize,
    /// A terminal event was seen; the stream should be released.
    pub close_stream: bool,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.frames += other.frames;
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.decode_errors += other.decode_errors;
        self.close_stream |= other.close_stream;
    }
}

#[derive(Debug, Default)]
pub struct TaskSession {
    policy: VisibilityPolicy,
    decoder: SseDecoder,
    lifecycle: TaskLifecycle,
    conversation: Arc<Conversation>,
}

impl TaskSession {
    pub fn new(policy: VisibilityPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn set_on_task_created(&mut self, hook: TaskCreatedHook) {
        self.lifecycle.set_on_task_created(hook);
    }

    /// Start a fresh conversation, optionally greeting the user.
    pub fn open(&mut self, welcome: Option<Message>) {
        self.conversation = Arc::new(match welcome {
            Some(message) => Conversation::with_welcome(message),
            None => Conversation::new(),
        });
        self.lifecycle.reset();
        self.decoder.reset();
    }

    /// Begin a new task with the user's prompt. The previous task's
    /// transcript stays visible but is sealed.
    pub fn submit(&mut self, prompt: &str) {
        let conversation = Arc::make_mut(&mut self.conversation);
        if let Some(current) = conversation.current_mut() {
            *current = reduce::seal(std::mem::take(current));
        }
        conversation.begin_task(Message::user(prompt));
        self.lifecycle.submit();
        self.decoder.reset();
    }

    /// Follow an already running task. Opens an empty segment bound to
    /// `task_id` instead of a prompt.
    pub fn attach(&mut self, task_id: &str) -> bool {
        let conversation = Arc::make_mut(&mut self.conversation);
        if let Some(current) = conversation.current_mut() {
            *current = reduce::seal(std::mem::take(current));
        }
        conversation.push_segment(Transcript::new());
        self.lifecycle.submit();
        self.decoder.reset();
        self.bind_task(task_id)
    }

    pub fn bind_task(&mut self, task_id: &str) -> bool {
        let bound = self.lifecycle.bind_task(task_id);
        self.sync_task_id();
        bound
    }

    /// Feed raw bytes from the transport.
    pub fn ingest(&mut self, bytes: &[u8]) -> IngestReport {
        let mut report = IngestReport::default();
        for result in self.decoder.feed(bytes) {
            self.process(result, &mut report);
        }
        report
    }

    /// Process one already-decoded frame.
    pub fn ingest_frame(&mut self, frame: SseFrame) -> IngestReport {
        let mut report = IngestReport::default();
        self.process(Ok(frame), &mut report);
        report
    }

    /// The transport reported end of stream.
    pub fn finish_stream(&mut self) -> IngestReport {
        let mut report = IngestReport::default();
        if let Some(result) = self.decoder.finish() {
            self.process(result, &mut report);
        }
        self.lifecycle.on_end_of_stream();
        self.settle_current();
        info!(
            "Stream closed (task {}, state {})",
            self.lifecycle.task_id().unwrap_or("unbound"),
            self.lifecycle.state()
        );
        report
    }

    /// The transport failed. Busy is cleared and the failure is shown.
    pub fn on_transport_error(&mut self, error: &str) {
        warn!("Transport error: {error}");
        self.lifecycle.on_transport_error();
        self.push_message(Message::network_error(error));
    }

    /// The user stopped following the task. Busy is cleared and the state
    /// is kept; nothing is appended to the transcript.
    pub fn on_cancel(&mut self) {
        self.lifecycle.on_cancel();
        info!(
            "Stopped following task {} in state {}",
            self.lifecycle.task_id().unwrap_or("unbound"),
            self.lifecycle.state()
        );
    }

    /// A new connection is about to deliver bytes; drop any partial frame.
    pub fn reconnect(&mut self) {
        self.decoder.reset();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation: Arc::clone(&self.conversation),
            status: self.lifecycle.status(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.lifecycle.status()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn should_close(&self) -> bool {
        self.lifecycle.state().is_terminal()
    }

    pub fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    fn process(&mut self, result: Result<SseFrame, DecodeError>, report: &mut IngestReport) {
        let frame = match result {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping malformed SSE frame: {err}");
                report.decode_errors += 1;
                return;
            }
        };
        report.frames += 1;

        let classification = self.policy.classify_frame(&frame);
        let admission = self.lifecycle.observe(&classification, &frame.payload);
        report.close_stream |= admission.close_stream;
        self.sync_task_id();

        let message = admission
            .deliver
            .then(|| map_event(&classification, &frame.payload))
            .flatten();
        match message {
            Some(message) => {
                self.push_message(message);
                report.applied += 1;
            }
            None => report.skipped += 1,
        }
        if admission.close_stream {
            self.settle_current();
        }
    }

    /// No more content will reach the current segment; settle its open chunk.
    fn settle_current(&mut self) {
        let has_open = self
            .conversation
            .current()
            .is_some_and(|current| current.open_chunk().is_some());
        if !has_open {
            return;
        }
        if let Some(current) = Arc::make_mut(&mut self.conversation).current_mut() {
            *current = reduce::finalize(std::mem::take(current));
        }
    }

    fn push_message(&mut self, message: Message) {
        let conversation = Arc::make_mut(&mut self.conversation);
        let created = conversation.current().is_none();
        if created {
            conversation.push_segment(Transcript::new());
        }
        if let Some(current) = conversation.current_mut() {
            *current = reduce::apply(std::mem::take(current), message);
        }
        if created {
            self.sync_task_id();
        }
    }

    /// Copy the bound task id onto the current transcript.
    fn sync_task_id(&mut self) {
        let Some(task_id) = self.lifecycle.task_id() else {
            return;
        };
        let needs_update = self
            .conversation
            .current()
            .is_some_and(|current| current.task_id.is_none());
        if needs_update {
            let task_id = task_id.to_string();
            if let Some(current) = Arc::make_mut(&mut self.conversation).current_mut() {
                current.task_id = Some(task_id);
            }
        }
    }
}
