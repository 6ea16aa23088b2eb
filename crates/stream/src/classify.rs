//! Effective event type resolution and transcript visibility.
//!
//! Classification is a pure function of one event; it never looks at the
//! transcript.

use agentdeck_core::TaskState;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

use crate::decode::SseFrame;

/// Namespace prefixes stripped (once) from the effective type.
const NAMESPACE_PREFIXES: &[&str] = &["workflow.", "agent.", "events."];

/// Resolve the type used for all downstream branching.
///
/// Order: `payload.event_type`, then `payload.original_event_type`, then the
/// transport type. One known namespace prefix is removed.
pub fn effective_type(raw_type: &str, payload: &Map<String, Value>) -> String {
    let declared = str_field(payload, "event_type")
        .or_else(|| str_field(payload, "original_event_type"))
        .unwrap_or(raw_type);
    strip_namespace(declared).to_string()
}

fn strip_namespace(value: &str) -> &str {
    NAMESPACE_PREFIXES
        .iter()
        .find_map(|prefix| value.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(value)
}

fn str_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Closed set of event kinds the pipeline branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Heartbeat,
    Connected,
    TaskCreated,
    TaskCompleted,
    TaskFailed,
    LlmResponse,
    LlmChunk,
    ToolCallStarted,
    ToolResult,
    Error,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowResult,
    SystemNote,
    Unknown,
}

impl EventKind {
    pub fn from_effective_type(effective_type: &str) -> Self {
        match effective_type {
            "heartbeat" | "Heartbeat" | "ping" => Self::Heartbeat,
            "connected" | "Connected" | "stream_connected" => Self::Connected,
            "task_created" | "TaskCreated" => Self::TaskCreated,
            "task_completed" | "TaskCompleted" => Self::TaskCompleted,
            "task_failed" | "TaskFailed" => Self::TaskFailed,
            "LLMCallCompleted" | "LLMResponse" | "llm_response" => Self::LlmResponse,
            "LLMCallChunk" | "llm_chunk" => Self::LlmChunk,
            "ToolCallStarted" | "tool_call_started" => Self::ToolCallStarted,
            "ToolCallCompleted" | "ToolCallFailed" | "ToolResult" | "tool_result" => {
                Self::ToolResult
            }
            "WorkflowCompleted" | "workflow_completed" => Self::WorkflowCompleted,
            "WorkflowFailed" | "workflow_failed" => Self::WorkflowFailed,
            "WorkflowResult" | "workflow_result" => Self::WorkflowResult,
            "error" | "Error" => Self::Error,
            "log" | "debug" | "note" | "system_note" | "SystemNote" => Self::SystemNote,
            other if other.ends_with("Error") => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Kinds that end the task.
    pub fn is_terminal(&self) -> bool {
        self.terminal_state().is_some()
    }

    /// Terminal state implied by the kind alone.
    pub fn terminal_state(&self) -> Option<TaskState> {
        match self {
            Self::WorkflowCompleted | Self::WorkflowResult | Self::TaskCompleted => {
                Some(TaskState::Completed)
            }
            Self::WorkflowFailed | Self::TaskFailed => Some(TaskState::Failed),
            _ => None,
        }
    }

    /// Kinds observed only by the lifecycle controller.
    pub fn is_lifecycle_only(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::TaskCreated | Self::TaskCompleted
        )
    }
}

/// Result of classifying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub effective_type: String,
    pub kind: EventKind,
    /// Whether the event may become a transcript entry.
    pub visible: bool,
    /// Event-less `"message"` frame kept only for connection liveness.
    pub transport_heartbeat: bool,
    /// Terminal state this event moves the task to, if any.
    pub terminal: Option<TaskState>,
}

impl Classification {
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Static allow/deny policy over effective types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityPolicy {
    pub hidden_types: BTreeSet<String>,
    /// Render explicit heartbeat events as system notes.
    pub show_heartbeats: bool,
}

impl VisibilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_heartbeats(mut self, show: bool) -> Self {
        self.show_heartbeats = show;
        self
    }

    pub fn classify(&self, raw_type: &str, payload: &Map<String, Value>) -> Classification {
        if raw_type == SseFrame::DEFAULT_TYPE && !payload.contains_key("event_type") {
            return Classification {
                effective_type: raw_type.to_string(),
                kind: EventKind::Heartbeat,
                visible: false,
                transport_heartbeat: true,
                terminal: None,
            };
        }

        let effective_type = effective_type(raw_type, payload);
        let kind = EventKind::from_effective_type(&effective_type);

        let visible = match kind {
            EventKind::Unknown => {
                debug!("Unknown event type '{effective_type}', not shown");
                false
            }
            EventKind::Heartbeat => self.show_heartbeats,
            kind if kind.is_lifecycle_only() => false,
            _ => !self.hidden_types.contains(&effective_type),
        };

        let terminal = match kind {
            EventKind::WorkflowResult
                if payload.get("success").and_then(read_bool) == Some(false) =>
            {
                Some(TaskState::Failed)
            }
            kind => kind.terminal_state(),
        };

        Classification {
            effective_type,
            kind,
            visible,
            transport_heartbeat: false,
            terminal,
        }
    }

    pub fn classify_frame(&self, frame: &SseFrame) -> Classification {
        self.classify(&frame.raw_type, &frame.payload)
    }
}

/// Boolean field value; also accepts the usual string spellings.
pub(crate) fn read_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
