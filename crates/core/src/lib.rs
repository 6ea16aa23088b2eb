pub mod conversation;
pub mod jsonl;
pub mod message;
pub mod stats;
pub mod task;
pub mod transcript;

pub use conversation::Conversation;
pub use message::{Message, MessageBody, MessageEnvelope, NoteLevel, Usage};
pub use stats::TranscriptStats;
pub use task::{TaskState, TaskStatus};
pub use transcript::Transcript;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
