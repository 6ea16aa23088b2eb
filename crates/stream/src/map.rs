//! Event-to-message mapping.
//!
//! Stateless: each visible event becomes at most one message. Ordering and
//! chunk merging are left to the reducer.

use agentdeck_core::{Message, MessageBody, MessageEnvelope, NoteLevel, Usage};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::classify::{Classification, EventKind, read_bool};

/// Stream id used for chunks that carry no identifier at all.
pub const DEFAULT_STREAM_ID: &str = "llm-stream";

/// Keys that identify one model response.
const RESPONSE_ID_KEYS: &[&str] = &["response_id", "message_id", "llm_call_id", "call_id"];
/// Looser ids used when no response id is present.
const FALLBACK_STREAM_ID_KEYS: &[&str] = &["id", "task_id"];
const EVENT_ID_KEYS: &[&str] = &["event_id", "id"];
const TOOL_NAME_KEYS: &[&str] = &["tool_name", "name", "tool"];
const TOOL_CALL_ID_KEYS: &[&str] = &["tool_call_id", "call_id", "id"];
const ARGUMENT_KEYS: &[&str] = &["arguments", "args", "input", "parameters"];
const RESULT_KEYS: &[&str] = &["result", "output"];
const DURATION_KEYS: &[&str] = &["execution_time_ms", "duration_ms"];
const RESPONSE_TEXT_KEYS: &[&str] = &["response", "content", "text", "message"];
const CHUNK_TEXT_KEYS: &[&str] = &["chunk", "content", "delta"];
const ERROR_TEXT_KEYS: &[&str] = &["message", "error_message"];
const WORKFLOW_TEXT_KEYS: &[&str] = &["result", "content", "output", "response", "message"];
const NOTE_TEXT_KEYS: &[&str] = &["message", "content", "text", "note"];

/// Map a classified event to its transcript message.
///
/// Returns `None` for lifecycle-only and unknown kinds.
pub fn map_event(classification: &Classification, payload: &Map<String, Value>) -> Option<Message> {
    if classification.transport_heartbeat {
        return None;
    }
    let body = match classification.kind {
        EventKind::LlmChunk => return Some(map_chunk(classification, payload)),
        EventKind::LlmResponse => return Some(map_response(classification, payload)),
        EventKind::ToolCallStarted => map_tool_started(payload),
        EventKind::ToolResult => map_tool_result(&classification.effective_type, payload),
        EventKind::Error | EventKind::TaskFailed => map_error(classification.kind, payload),
        EventKind::WorkflowCompleted | EventKind::WorkflowFailed | EventKind::WorkflowResult => {
            map_workflow(classification.kind, payload)
        }
        EventKind::SystemNote => MessageBody::SystemNote {
            message: first_text(payload, NOTE_TEXT_KEYS)
                .unwrap_or_else(|| classification.effective_type.clone()),
            level: first_str(payload, &["level"])
                .map(NoteLevel::parse)
                .unwrap_or_default(),
        },
        EventKind::Heartbeat => MessageBody::SystemNote {
            message: "heartbeat".to_string(),
            level: NoteLevel::Info,
        },
        EventKind::Connected | EventKind::TaskCreated | EventKind::TaskCompleted => return None,
        EventKind::Unknown => {
            debug!(
                "No message mapping for event type '{}'",
                classification.effective_type
            );
            return None;
        }
    };

    Some(Message::new(envelope(classification, payload), body))
}

// ── Envelope ────────────────────────────────────────────────────────────────

fn envelope(classification: &Classification, payload: &Map<String, Value>) -> MessageEnvelope {
    let id = first_str(payload, EVENT_ID_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    envelope_with_id(id, classification, payload)
}

fn envelope_with_id(
    id: String,
    classification: &Classification,
    payload: &Map<String, Value>,
) -> MessageEnvelope {
    let mut envelope = MessageEnvelope::new(id, classification.effective_type.clone())
        .with_agent(first_str(payload, &["agent_id", "agent_name"]).map(str::to_string));
    if let Some(timestamp) = payload.get("timestamp").and_then(parse_timestamp) {
        envelope = envelope.with_timestamp(timestamp);
    }
    envelope
}

/// RFC 3339 strings, or epoch seconds / milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => {
            let raw = number.as_f64()?;
            if raw > 1e12 {
                DateTime::from_timestamp_millis(raw as i64)
            } else {
                DateTime::from_timestamp(raw.trunc() as i64, 0)
            }
        }
        _ => None,
    }
}

fn stream_id(payload: &Map<String, Value>) -> Option<String> {
    scoped_stream_id(payload).map(|(id, _)| id)
}

/// The stream id and whether it names a single response.
fn scoped_stream_id(payload: &Map<String, Value>) -> Option<(String, bool)> {
    if let Some(id) = first_str(payload, RESPONSE_ID_KEYS) {
        return Some((id.to_string(), true));
    }
    first_str(payload, FALLBACK_STREAM_ID_KEYS).map(|id| (id.to_string(), false))
}

// ── Variants ────────────────────────────────────────────────────────────────

fn map_chunk(classification: &Classification, payload: &Map<String, Value>) -> Message {
    let (id, response_scoped) =
        scoped_stream_id(payload).unwrap_or_else(|| (DEFAULT_STREAM_ID.to_string(), false));
    Message::new(
        envelope_with_id(id, classification, payload),
        MessageBody::LlmChunk {
            content: CHUNK_TEXT_KEYS
                .iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string(),
            chunk_index: first_u64(payload, &["chunk_index", "index"]).unwrap_or(0),
            is_final: first_bool(payload, &["is_final", "final", "done"]).unwrap_or(false),
            response_scoped,
        },
    )
}

fn map_response(classification: &Classification, payload: &Map<String, Value>) -> Message {
    let envelope = match stream_id(payload) {
        Some(id) => envelope_with_id(id, classification, payload),
        None => envelope(classification, payload),
    };
    let tool_calls = payload
        .get("tool_calls")
        .and_then(Value::as_array)
        .filter(|calls| !calls.is_empty())
        .cloned();

    Message::new(
        envelope,
        MessageBody::LlmResponse {
            content: first_text(payload, RESPONSE_TEXT_KEYS).unwrap_or_default(),
            role: first_str(payload, &["role"]).map(str::to_string),
            tool_calls,
            usage: extract_usage(payload),
        },
    )
}

fn extract_usage(payload: &Map<String, Value>) -> Option<Usage> {
    let nested = payload.get("usage").and_then(Value::as_object);
    let source = nested.unwrap_or(payload);
    let usage = Usage {
        prompt_tokens: first_u64(source, &["prompt_tokens", "input_tokens"]),
        completion_tokens: first_u64(source, &["completion_tokens", "output_tokens"]),
        total_tokens: first_u64(source, &["total_tokens"]),
        cost: first_f64(source, &["cost", "total_cost"])
            .or_else(|| first_f64(payload, &["cost"])),
    };
    (usage != Usage::default()).then_some(usage)
}

fn map_tool_started(payload: &Map<String, Value>) -> MessageBody {
    MessageBody::ToolCallStarted {
        tool_name: tool_name(payload),
        tool_call_id: first_str(payload, TOOL_CALL_ID_KEYS)
            .unwrap_or_default()
            .to_string(),
        arguments: first_value(payload, ARGUMENT_KEYS)
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn map_tool_result(effective_type: &str, payload: &Map<String, Value>) -> MessageBody {
    let default_success = effective_type != "ToolCallFailed";
    MessageBody::ToolResult {
        tool_name: tool_name(payload),
        result: first_value(payload, RESULT_KEYS)
            .or_else(|| payload.get("error"))
            .cloned()
            .unwrap_or(Value::Null),
        success: first_bool(payload, &["success"]).unwrap_or(default_success),
        execution_time_ms: first_u64(payload, DURATION_KEYS),
        arguments: first_value(payload, ARGUMENT_KEYS).cloned(),
    }
}

fn tool_name(payload: &Map<String, Value>) -> String {
    first_str(payload, TOOL_NAME_KEYS)
        .unwrap_or("unknown")
        .to_string()
}

fn map_error(kind: EventKind, payload: &Map<String, Value>) -> MessageBody {
    let error_object = payload.get("error").and_then(Value::as_object);
    let error = match payload.get("error") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => error_object
            .and_then(|obj| first_str(obj, &["message"]))
            .map(str::to_string),
    }
    .or_else(|| first_text(payload, ERROR_TEXT_KEYS))
    .unwrap_or_else(|| match kind {
        EventKind::TaskFailed => "Task failed".to_string(),
        _ => "Unknown error".to_string(),
    });

    let error_type = first_str(payload, &["error_type"])
        .or_else(|| error_object.and_then(|obj| first_str(obj, &["type", "code"])))
        .map(str::to_string)
        .or_else(|| (kind == EventKind::TaskFailed).then(|| "task_failed".to_string()));
    let inferred = error_type
        .as_deref()
        .map(ErrorCategories::infer)
        .unwrap_or_default();

    MessageBody::ErrorMessage {
        error,
        retryable: first_bool(payload, &["retryable", "is_retryable"]).unwrap_or(true),
        auth_error: flag(payload, &["auth_error", "is_auth_error"], inferred.auth),
        rate_limit_error: flag(
            payload,
            &["rate_limit_error", "is_rate_limit_error"],
            inferred.rate_limit,
        ),
        quota_error: flag(payload, &["quota_error", "is_quota_error"], inferred.quota),
        model_error: flag(payload, &["model_error", "is_model_error"], inferred.model),
        network_error: flag(
            payload,
            &["network_error", "is_network_error"],
            inferred.network,
        ),
        error_type,
    }
}

/// Category flags implied by an `error_type` label. Not mutually exclusive.
#[derive(Debug, Default, PartialEq, Eq)]
struct ErrorCategories {
    auth: bool,
    rate_limit: bool,
    quota: bool,
    model: bool,
    network: bool,
}

impl ErrorCategories {
    fn infer(error_type: &str) -> Self {
        let lower = error_type.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
        Self {
            auth: has(&["auth", "unauthorized", "forbidden", "api_key"]),
            rate_limit: has(&["rate_limit", "ratelimit", "too_many_requests"]),
            quota: has(&["quota", "billing", "insufficient"]),
            model: has(&["model"]),
            network: has(&["network", "connection", "timeout"]),
        }
    }
}

/// Explicit payload flag wins; otherwise `Some(true)` when inferred.
fn flag(payload: &Map<String, Value>, keys: &[&str], inferred: bool) -> Option<bool> {
    first_bool(payload, keys).or(inferred.then_some(true))
}

fn map_workflow(kind: EventKind, payload: &Map<String, Value>) -> MessageBody {
    let success = match kind {
        EventKind::WorkflowFailed => false,
        EventKind::WorkflowResult => first_bool(payload, &["success"]).unwrap_or(true),
        _ => true,
    };
    let content = first_text(payload, WORKFLOW_TEXT_KEYS)
        .or_else(|| {
            if success {
                None
            } else {
                first_text(payload, &["error"])
            }
        })
        .unwrap_or_default();

    MessageBody::WorkflowResult {
        content,
        success,
        iterations_completed: first_u64(payload, &["iterations_completed", "iterations"]),
        total_cost: first_f64(payload, &["total_cost", "cost"]),
    }
}

// ── Field helpers ───────────────────────────────────────────────────────────

fn first_value<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

fn first_str<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Text from the first present key; non-string values are rendered as JSON.
fn first_text(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_value(payload, keys).and_then(|value| match value {
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    })
}

fn first_u64(payload: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::Number(number) => number
                .as_u64()
                .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        })
}

fn first_f64(payload: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        })
}

fn first_bool(payload: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(read_bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VisibilityPolicy;
    use serde_json::json;

    fn map(payload: Value) -> Option<Message> {
        let Value::Object(payload) = payload else {
            panic!("payload must be an object");
        };
        let classification = VisibilityPolicy::new().classify("message", &payload);
        map_event(&classification, &payload)
    }

    fn body(payload: Value) -> MessageBody {
        map(payload).expect("event should map").body
    }

    #[test]
    fn chunk_fields_pass_through() {
        let message = map(json!({
            "event_type": "LLMCallChunk",
            "response_id": "resp-1",
            "task_id": "task-9",
            "chunk": "Hel",
            "chunk_index": 0,
            "is_final": false
        }))
        .unwrap();
        assert_eq!(message.id(), "resp-1");
        assert_eq!(message.envelope.event_type, "LLMCallChunk");
        assert_eq!(
            message.body,
            MessageBody::LlmChunk {
                content: "Hel".to_string(),
                chunk_index: 0,
                is_final: false,
                response_scoped: true,
            }
        );
    }

    #[test]
    fn chunk_keyed_by_task_is_not_response_scoped() {
        let scoped = |payload: Value| match map(payload).map(|m| m.body) {
            Some(MessageBody::LlmChunk {
                response_scoped, ..
            }) => response_scoped,
            other => panic!("unexpected body: {other:?}"),
        };
        assert!(scoped(json!({"event_type": "LLMCallChunk", "llm_call_id": "c1", "task_id": "t1", "chunk": "a"})));
        assert!(!scoped(json!({"event_type": "LLMCallChunk", "task_id": "t1", "chunk": "a"})));
        assert!(!scoped(json!({"event_type": "LLMCallChunk", "chunk": "a"})));
    }

    #[test]
    fn string_success_flag_agrees_with_task_state() {
        let Value::Object(payload) =
            json!({"event_type": "workflow_result", "success": "false", "result": "gave up"})
        else {
            panic!("payload must be an object");
        };
        let classification = VisibilityPolicy::new().classify("message", &payload);
        assert_eq!(classification.terminal, Some(agentdeck_core::TaskState::Failed));
        match map_event(&classification, &payload).map(|m| m.body) {
            Some(MessageBody::WorkflowResult { success, .. }) => assert!(!success),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn chunk_whitespace_is_preserved() {
        match body(json!({"event_type": "LLMCallChunk", "id": "r", "chunk": " world\n"})) {
            MessageBody::LlmChunk { content, .. } => assert_eq!(content, " world\n"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn chunk_id_falls_back_to_task_id_then_default() {
        let with_task = map(json!({"event_type": "LLMCallChunk", "task_id": "t1", "chunk": "a"}));
        assert_eq!(with_task.unwrap().id(), "t1");

        let bare = map(json!({"event_type": "LLMCallChunk", "chunk": "a"}));
        assert_eq!(bare.unwrap().id(), DEFAULT_STREAM_ID);
    }

    #[test]
    fn response_keeps_raw_cost_and_usage() {
        let message = map(json!({
            "event_type": "LLMCallCompleted",
            "response_id": "resp-1",
            "response": "Hello!",
            "role": "assistant",
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "cost": 0.000123456}
        }))
        .unwrap();
        assert_eq!(message.id(), "resp-1");
        match message.body {
            MessageBody::LlmResponse { content, usage, .. } => {
                assert_eq!(content, "Hello!");
                let usage = usage.unwrap();
                assert_eq!(usage.cost, Some(0.000123456));
                assert_eq!(usage.display_cost().as_deref(), Some("0.0001"));
                assert_eq!(usage.effective_total_tokens(), Some(15));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn tool_started_keeps_arguments_verbatim() {
        let args = json!({"query": "rust sse", "limit": [1, 2, {"deep": null}]});
        match body(json!({
            "event_type": "ToolCallStarted",
            "name": "search",
            "call_id": "c-1",
            "arguments": args.clone()
        })) {
            MessageBody::ToolCallStarted {
                tool_name,
                tool_call_id,
                arguments,
            } => {
                assert_eq!(tool_name, "search");
                assert_eq!(tool_call_id, "c-1");
                assert_eq!(arguments, args);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn tool_result_success_defaults_true() {
        match body(json!({"event_type": "tool_result", "tool": "search", "output": "3 hits", "duration_ms": 41.6})) {
            MessageBody::ToolResult {
                tool_name,
                result,
                success,
                execution_time_ms,
                ..
            } => {
                assert_eq!(tool_name, "search");
                assert_eq!(result, json!("3 hits"));
                assert!(success);
                assert_eq!(execution_time_ms, Some(42));
            }
            other => panic!("unexpected body: {other:?}"),
        }

        match body(json!({"event_type": "ToolCallFailed", "tool_name": "fetch", "error": "404"})) {
            MessageBody::ToolResult { success, result, .. } => {
                assert!(!success);
                assert_eq!(result, json!("404"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn error_defaults_and_inferred_flags() {
        match body(json!({
            "event_type": "LLMCallError",
            "error": {"message": "Rate limit exceeded", "type": "rate_limit_error"},
            "auth_error": false
        })) {
            MessageBody::ErrorMessage {
                error,
                error_type,
                retryable,
                auth_error,
                rate_limit_error,
                quota_error,
                ..
            } => {
                assert_eq!(error, "Rate limit exceeded");
                assert_eq!(error_type.as_deref(), Some("rate_limit_error"));
                assert!(retryable);
                assert_eq!(auth_error, Some(false));
                assert_eq!(rate_limit_error, Some(true));
                assert_eq!(quota_error, None);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn error_flags_are_not_exclusive() {
        match body(json!({
            "event_type": "error",
            "message": "boom",
            "retryable": false,
            "is_auth_error": true,
            "is_quota_error": true
        })) {
            MessageBody::ErrorMessage {
                error,
                retryable,
                auth_error,
                quota_error,
                ..
            } => {
                assert_eq!(error, "boom");
                assert!(!retryable);
                assert_eq!(auth_error, Some(true));
                assert_eq!(quota_error, Some(true));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn task_failed_maps_to_error_message() {
        match body(json!({"event_type": "task_failed", "task_id": "t1"})) {
            MessageBody::ErrorMessage {
                error, error_type, ..
            } => {
                assert_eq!(error, "Task failed");
                assert_eq!(error_type.as_deref(), Some("task_failed"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn workflow_success_derived_from_type() {
        match body(json!({"event_type": "WorkflowCompleted", "result": "Done", "iterations": 2})) {
            MessageBody::WorkflowResult {
                content,
                success,
                iterations_completed,
                ..
            } => {
                assert_eq!(content, "Done");
                assert!(success);
                assert_eq!(iterations_completed, Some(2));
            }
            other => panic!("unexpected body: {other:?}"),
        }

        match body(json!({"event_type": "WorkflowFailed", "error": "gave up", "total_cost": 0.25})) {
            MessageBody::WorkflowResult {
                content,
                success,
                total_cost,
                ..
            } => {
                assert_eq!(content, "gave up");
                assert!(!success);
                assert_eq!(total_cost, Some(0.25));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn structured_workflow_result_is_rendered_as_json() {
        match body(json!({"event_type": "workflow_result", "result": {"answer": 42}})) {
            MessageBody::WorkflowResult { content, .. } => {
                assert_eq!(content, "{\"answer\":42}");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn system_note_level_defaults_to_info() {
        match body(json!({"event_type": "log", "message": "retrying tool"})) {
            MessageBody::SystemNote { message, level } => {
                assert_eq!(message, "retrying tool");
                assert_eq!(level, NoteLevel::Info);
            }
            other => panic!("unexpected body: {other:?}"),
        }
        match body(json!({"event_type": "debug", "message": "x", "level": "warning"})) {
            MessageBody::SystemNote { level, .. } => assert_eq!(level, NoteLevel::Warning),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn lifecycle_events_have_no_message() {
        assert!(map(json!({"event_type": "connected"})).is_none());
        assert!(map(json!({"event_type": "task_created", "task_id": "t1"})).is_none());
        assert!(map(json!({"event_type": "BrandNewEvent"})).is_none());
    }

    #[test]
    fn envelope_uses_event_id_timestamp_and_agent() {
        let message = map(json!({
            "event_type": "ToolCallStarted",
            "event_id": "evt-7",
            "agent_id": "researcher",
            "timestamp": "2026-03-01T10:00:00Z",
            "tool_name": "search"
        }))
        .unwrap();
        assert_eq!(message.id(), "evt-7");
        assert_eq!(message.envelope.agent_id.as_deref(), Some("researcher"));
        assert_eq!(
            message.envelope.timestamp.to_rfc3339(),
            "2026-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn missing_event_id_gets_uuid() {
        let message = map(json!({"event_type": "ToolCallStarted", "tool_name": "x"})).unwrap();
        assert!(uuid::Uuid::parse_str(message.id()).is_ok());
    }
}
