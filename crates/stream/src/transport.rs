//! Async seam between a byte transport and the synchronous session.
//!
//! `pump` owns its source: every exit path (terminal task, end of stream,
//! transport failure, cancellation) drops it, which releases the connection.

use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, info};

use agentdeck_core::TaskState;

use crate::session::{SessionSnapshot, TaskSession};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("stream closed by peer")]
    Closed,
}

/// Anything that yields the raw bytes of one task's event stream, in order.
pub trait ByteSource {
    /// Next read. `Ok(None)` means the stream ended cleanly.
    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;
}

/// In-memory source replaying a captured stream in fixed-size reads.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    data: Vec<u8>,
    chunk_size: usize,
    offset: usize,
}

impl ReplaySource {
    pub fn new(data: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

impl ByteSource for ReplaySource {
    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send {
        let chunk = if self.offset >= self.data.len() {
            None
        } else {
            let end = (self.offset + self.chunk_size).min(self.data.len());
            let chunk = self.data[self.offset..end].to_vec();
            self.offset = end;
            Some(chunk)
        };
        std::future::ready(Ok(chunk))
    }
}

/// How a pump run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The task reached a terminal state.
    Closed(TaskState),
    EndOfStream,
    TransportFailed(String),
    Cancelled,
}

/// Drive `source` into `session` until the task ends, the stream ends, the
/// transport fails or `cancel` turns true. A snapshot is published after
/// every read.
pub async fn pump<S: ByteSource>(
    mut source: S,
    session: &mut TaskSession,
    cancel: &mut watch::Receiver<bool>,
    snapshots: &watch::Sender<SessionSnapshot>,
) -> PumpOutcome {
    let mut cancel_open = true;

    loop {
        if *cancel.borrow() {
            info!("Stream cancelled, releasing connection");
            session.on_cancel();
            snapshots.send_replace(session.snapshot());
            return PumpOutcome::Cancelled;
        }

        let next = if cancel_open {
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() {
                        debug!("Cancel handle dropped, pumping until the stream ends");
                        cancel_open = false;
                    }
                    continue;
                }
                chunk = source.next_chunk() => chunk,
            }
        } else {
            source.next_chunk().await
        };

        match next {
            Ok(Some(bytes)) => {
                let report = session.ingest(&bytes);
                snapshots.send_replace(session.snapshot());
                if report.close_stream || session.should_close() {
                    let state = session.state();
                    info!("Task {state}, releasing stream");
                    return PumpOutcome::Closed(state);
                }
            }
            Ok(None) => {
                session.finish_stream();
                snapshots.send_replace(session.snapshot());
                if session.should_close() {
                    return PumpOutcome::Closed(session.state());
                }
                return PumpOutcome::EndOfStream;
            }
            Err(err) => {
                let message = err.to_string();
                session.on_transport_error(&message);
                snapshots.send_replace(session.snapshot());
                return PumpOutcome::TransportFailed(message);
            }
        }
    }
}
