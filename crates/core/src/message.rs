use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields shared by every transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct MessageEnvelope {
    /// Message identifier. For streamed LLM output this is the response id
    /// shared by every chunk of the same response.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Effective event type the message was derived from ("local" for
    /// messages authored on this side of the stream).
    pub event_type: String,
}

impl MessageEnvelope {
    pub const LOCAL_EVENT_TYPE: &'static str = "local";

    pub fn new(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            agent_id: None,
            event_type: event_type.into(),
        }
    }

    /// Envelope for a locally authored message with a fresh id.
    pub fn local() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), Self::LOCAL_EVENT_TYPE)
    }

    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Message {
    pub envelope: MessageEnvelope,
    pub body: MessageBody,
}

/// Message variants - closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum MessageBody {
    /// Prompt typed by the user. Never arrives via the stream.
    UserMessage { content: String },
    /// Greeting synthesized when a conversation opens.
    AssistantWelcome { content: String },
    /// Complete model response.
    LlmResponse {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<serde_json::Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Streaming model output. `content` holds everything accumulated so far.
    LlmChunk {
        content: String,
        chunk_index: u64,
        is_final: bool,
        /// The id names a single response, so a final chunk retires it.
        /// False when the id was borrowed from the task or a fallback.
        #[serde(default = "default_true")]
        response_scoped: bool,
    },
    ToolCallStarted {
        tool_name: String,
        tool_call_id: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_name: String,
        result: serde_json::Value,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
    },
    ErrorMessage {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate_limit_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quota_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network_error: Option<bool>,
    },
    WorkflowResult {
        content: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iterations_completed: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost: Option<f64>,
    },
    /// Non-conversational annotation. Never merged with neighbours.
    SystemNote {
        message: String,
        #[serde(default)]
        level: NoteLevel,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum NoteLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl NoteLevel {
    /// Lenient parse used for payload values; unknown labels fall back to `Info`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "warning" | "warn" => Self::Warning,
            "error" | "err" | "fatal" => Self::Error,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Token usage reported with a model response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl Usage {
    /// Cost rendered with 4 decimals. The stored value is left untouched.
    pub fn display_cost(&self) -> Option<String> {
        self.cost.map(|cost| format!("{cost:.4}"))
    }

    /// Total tokens, summing the parts when the total is not reported.
    pub fn effective_total_tokens(&self) -> Option<u64> {
        self.total_tokens.or_else(|| {
            match (self.prompt_tokens, self.completion_tokens) {
                (None, None) => None,
                (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
            }
        })
    }
}

fn default_true() -> bool {
    true
}

impl Message {
    pub fn new(envelope: MessageEnvelope, body: MessageBody) -> Self {
        Self { envelope, body }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(
            MessageEnvelope::local(),
            MessageBody::UserMessage {
                content: content.into(),
            },
        )
    }

    pub fn welcome(agent_id: Option<String>, content: impl Into<String>) -> Self {
        Self::new(
            MessageEnvelope::local().with_agent(agent_id),
            MessageBody::AssistantWelcome {
                content: content.into(),
            },
        )
    }

    pub fn system_note(message: impl Into<String>, level: NoteLevel) -> Self {
        Self::new(
            MessageEnvelope::local(),
            MessageBody::SystemNote {
                message: message.into(),
                level,
            },
        )
    }

    /// Plain retryable error with no category flags set.
    pub fn error(envelope: MessageEnvelope, error: impl Into<String>) -> Self {
        Self::new(
            envelope,
            MessageBody::ErrorMessage {
                error: error.into(),
                error_type: None,
                retryable: true,
                auth_error: None,
                rate_limit_error: None,
                quota_error: None,
                model_error: None,
                network_error: None,
            },
        )
    }

    /// Error authored on this side of the stream (e.g. a dropped connection).
    pub fn network_error(error: impl Into<String>) -> Self {
        let mut message = Self::error(MessageEnvelope::local(), error);
        if let MessageBody::ErrorMessage {
            error_type,
            network_error,
            ..
        } = &mut message.body
        {
            *error_type = Some("transport".to_string());
            *network_error = Some(true);
        }
        message
    }

    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self.body, MessageBody::LlmChunk { .. })
    }

    /// True for a streaming chunk that has not been finalized yet.
    pub fn is_open_chunk(&self) -> bool {
        matches!(self.body, MessageBody::LlmChunk { is_final: false, .. })
    }

    pub fn kind(&self) -> &'static str {
        match &self.body {
            MessageBody::UserMessage { .. } => "user_message",
            MessageBody::AssistantWelcome { .. } => "assistant_welcome",
            MessageBody::LlmResponse { .. } => "llm_response",
            MessageBody::LlmChunk { .. } => "llm_chunk",
            MessageBody::ToolCallStarted { .. } => "tool_call_started",
            MessageBody::ToolResult { .. } => "tool_result",
            MessageBody::ErrorMessage { .. } => "error_message",
            MessageBody::WorkflowResult { .. } => "workflow_result",
            MessageBody::SystemNote { .. } => "system_note",
        }
    }

    /// Best-effort primary text of the message, for list previews.
    pub fn text(&self) -> &str {
        match &self.body {
            MessageBody::UserMessage { content }
            | MessageBody::AssistantWelcome { content }
            | MessageBody::LlmResponse { content, .. }
            | MessageBody::LlmChunk { content, .. }
            | MessageBody::WorkflowResult { content, .. } => content,
            MessageBody::ToolCallStarted { tool_name, .. }
            | MessageBody::ToolResult { tool_name, .. } => tool_name,
            MessageBody::ErrorMessage { error, .. } => error,
            MessageBody::SystemNote { message, .. } => message,
        }
    }
}
