use crate::message::{Message, MessageBody, MessageEnvelope, Usage};

/// Streaming chunk with an explicit stream id.
pub fn chunk(id: &str, index: u64, content: &str, is_final: bool) -> Message {
    Message::new(
        MessageEnvelope::new(id, "LLMCallChunk"),
        MessageBody::LlmChunk {
            content: content.to_string(),
            chunk_index: index,
            is_final,
            response_scoped: true,
        },
    )
}

/// Streaming chunk whose id was borrowed from the task rather than a response.
pub fn task_keyed_chunk(task_id: &str, index: u64, content: &str, is_final: bool) -> Message {
    Message::new(
        MessageEnvelope::new(task_id, "LLMCallChunk"),
        MessageBody::LlmChunk {
            content: content.to_string(),
            chunk_index: index,
            is_final,
            response_scoped: false,
        },
    )
}

/// Complete model response without usage.
pub fn response(id: &str, content: &str) -> Message {
    Message::new(
        MessageEnvelope::new(id, "LLMCallCompleted"),
        MessageBody::LlmResponse {
            content: content.to_string(),
            role: Some("assistant".to_string()),
            tool_calls: None,
            usage: None,
        },
    )
}

/// Model response carrying token usage and cost.
pub fn response_with_usage(id: &str, content: &str, total_tokens: u64, cost: f64) -> Message {
    Message::new(
        MessageEnvelope::new(id, "LLMCallCompleted"),
        MessageBody::LlmResponse {
            content: content.to_string(),
            role: Some("assistant".to_string()),
            tool_calls: None,
            usage: Some(Usage {
                total_tokens: Some(total_tokens),
                cost: Some(cost),
                ..Usage::default()
            }),
        },
    )
}

pub fn tool_started(tool_name: &str, arguments: serde_json::Value) -> Message {
    let call_id = format!("call-{}", next_id());
    Message::new(
        MessageEnvelope::new(call_id.clone(), "ToolCallStarted"),
        MessageBody::ToolCallStarted {
            tool_name: tool_name.to_string(),
            tool_call_id: call_id,
            arguments,
        },
    )
}

pub fn tool_result(tool_name: &str, result: serde_json::Value, success: bool) -> Message {
    Message::new(
        MessageEnvelope::new(format!("test-{}", next_id()), "ToolCallCompleted"),
        MessageBody::ToolResult {
            tool_name: tool_name.to_string(),
            result,
            success,
            execution_time_ms: None,
            arguments: None,
        },
    )
}

pub fn error(text: &str) -> Message {
    Message::error(
        MessageEnvelope::new(format!("test-{}", next_id()), "error"),
        text,
    )
}

pub fn workflow_result(content: &str, success: bool) -> Message {
    Message::new(
        MessageEnvelope::new(
            format!("test-{}", next_id()),
            if success {
                "WorkflowCompleted"
            } else {
                "WorkflowFailed"
            },
        ),
        MessageBody::WorkflowResult {
            content: content.to_string(),
            success,
            iterations_completed: None,
            total_cost: None,
        },
    )
}

/// One SSE record carrying `payload` as its data line.
pub fn sse_frame(payload: &serde_json::Value) -> String {
    format!("data: {payload}\n\n")
}

/// One SSE record with an explicit `event:` field.
pub fn sse_named_frame(event: &str, payload: &serde_json::Value) -> String {
    format!("event: {event}\ndata: {payload}\n\n")
}

pub fn next_id() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
