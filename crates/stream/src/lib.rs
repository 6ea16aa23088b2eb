//! Task event stream processing: SSE bytes in, transcript snapshots out.

pub mod classify;
pub mod decode;
pub mod lifecycle;
pub mod map;
pub mod reduce;
pub mod session;
pub mod transport;

pub use classify::{Classification, EventKind, VisibilityPolicy};
pub use decode::{DecodeError, SseDecoder, SseFrame};
pub use lifecycle::{Admission, TaskCreatedHook, TaskLifecycle};
pub use map::map_event;
pub use session::{IngestReport, SessionSnapshot, TaskSession};
pub use transport::{ByteSource, PumpOutcome, ReplaySource, TransportError, pump};
