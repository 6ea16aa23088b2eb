//! Task lifecycle controller.
//!
//! Owns the task id binding, the coarse task state and the busy flag. It sees
//! every classified event before the mapper does, so a terminal event clears
//! `busy` even if building its message later goes wrong.

use agentdeck_core::{TaskState, TaskStatus};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::classify::{Classification, EventKind};

/// Called once per task id, when the id is first bound.
pub type TaskCreatedHook = Box<dyn FnMut(&str) + Send>;

/// What the pipeline should do with an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Admission {
    /// Hand the event to the mapper and reducer.
    pub deliver: bool,
    /// The task is over; release the stream.
    pub close_stream: bool,
}

#[derive(Default)]
pub struct TaskLifecycle {
    task_id: Option<String>,
    state: TaskState,
    busy: bool,
    notified: HashSet<String>,
    on_task_created: Option<TaskCreatedHook>,
}

impl fmt::Debug for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLifecycle")
            .field("task_id", &self.task_id)
            .field("state", &self.state)
            .field("busy", &self.busy)
            .finish_non_exhaustive()
    }
}

impl TaskLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_task_created(&mut self, hook: TaskCreatedHook) {
        self.on_task_created = Some(hook);
    }

    /// The user submitted a prompt: forget the previous task and go busy.
    pub fn submit(&mut self) {
        self.task_id = None;
        self.state = TaskState::Idle;
        self.busy = true;
    }

    /// Bind a server-assigned task id. Returns `true` when the binding changed.
    pub fn bind_task(&mut self, task_id: &str) -> bool {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return false;
        }
        if self.state.is_terminal() {
            warn!("Ignoring task id '{task_id}' after task reached {}", self.state);
            return false;
        }
        match self.task_id.as_deref() {
            Some(bound) if bound == task_id => return false,
            Some(bound) => {
                warn!("Ignoring task id '{task_id}', already bound to '{bound}'");
                return false;
            }
            None => {}
        }

        info!("Bound task '{task_id}'");
        self.task_id = Some(task_id.to_string());
        if self.state == TaskState::Idle {
            self.state = TaskState::Created;
        }
        if self.notified.insert(task_id.to_string()) {
            if let Some(hook) = self.on_task_created.as_mut() {
                hook(task_id);
            }
        }
        true
    }

    /// Observe one classified event and decide whether it reaches the reducer.
    pub fn observe(
        &mut self,
        classification: &Classification,
        payload: &Map<String, Value>,
    ) -> Admission {
        if classification.transport_heartbeat {
            return Admission::default();
        }

        if self.state.is_terminal() {
            warn!(
                "Dropping late '{}' event, task already {}",
                classification.effective_type, self.state
            );
            return Admission {
                deliver: false,
                close_stream: true,
            };
        }

        if classification.kind == EventKind::TaskCreated {
            if let Some(task_id) = ["task_id", "id"]
                .iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
            {
                self.bind_task(task_id);
            }
        }

        if let Some(terminal) = classification.terminal {
            if self.busy {
                debug!(
                    "Busy cleared by terminal '{}' event",
                    classification.effective_type
                );
            }
            self.busy = false;
            self.state = terminal;
            return Admission {
                deliver: classification.visible,
                close_stream: true,
            };
        }

        if !classification.visible {
            return Admission::default();
        }

        match self.state {
            TaskState::Idle => {
                debug!("Content arrived before a task id was bound");
                self.state = TaskState::Streaming;
            }
            TaskState::Created => self.state = TaskState::Streaming,
            _ => {}
        }
        Admission {
            deliver: true,
            close_stream: false,
        }
    }

    /// Connection-level failure: never leave the UI loading, keep the state.
    pub fn on_transport_error(&mut self) {
        self.busy = false;
    }

    pub fn on_end_of_stream(&mut self) {
        self.busy = false;
    }

    pub fn on_cancel(&mut self) {
        self.busy = false;
    }

    pub fn reset(&mut self) {
        self.task_id = None;
        self.state = TaskState::Idle;
        self.busy = false;
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            task_id: self.task_id.clone(),
            busy: self.busy,
            state: self.state,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}
