use std::io::{self, Write};

use agentdeck_core::{Conversation, Message, MessageBody, NoteLevel, TaskStatus, TranscriptStats};
use serde_json::json;

/// Output format for transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines, LLM output streamed as it arrives
    Text,
    /// One JSON document once the stream ends
    Json,
    /// One JSON message per line as each settles, then a status line
    Jsonl,
}

/// Incrementally prints a conversation as snapshots arrive.
///
/// Messages are printed once they are settled. An open chunk is held back
/// (text mode streams its growing content in place) until it is finalized,
/// so indices already printed never change.
pub struct LivePrinter {
    format: OutputFormat,
    printed: usize,
    /// Stream id and text already written for the open chunk.
    partial: Option<(String, String)>,
}

impl LivePrinter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            printed: 0,
            partial: None,
        }
    }

    pub fn update<W: Write>(&mut self, conversation: &Conversation, out: &mut W) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            return Ok(());
        }
        for message in conversation.messages().skip(self.printed) {
            if message.is_open_chunk() {
                if self.format == OutputFormat::Text {
                    self.stream_partial(message, out)?;
                }
                break;
            }
            match self.format {
                OutputFormat::Text => self.settle_text(message, out)?,
                _ => writeln!(out, "{}", message_json(message))?,
            }
            self.printed += 1;
        }
        out.flush()
    }

    /// Print whatever is left once the stream is over.
    pub fn finish<W: Write>(
        &mut self,
        conversation: &Conversation,
        status: &TaskStatus,
        out: &mut W,
    ) -> io::Result<()> {
        self.update(conversation, out)?;
        if let Some((_, streamed)) = self.partial.take() {
            if !streamed.is_empty() {
                writeln!(out)?;
            }
        }

        let stats = conversation
            .current()
            .map(TranscriptStats::compute)
            .unwrap_or_default();
        match self.format {
            OutputFormat::Text => writeln!(out, "{}", summary_line(status, &stats))?,
            OutputFormat::Json => {
                let messages: Vec<&Message> = conversation.messages().collect();
                let document = json!({
                    "status": status,
                    "stats": stats,
                    "messages": messages,
                });
                writeln!(out, "{document:#}")?;
            }
            OutputFormat::Jsonl => {
                writeln!(out, "{}", json!({"type": "status", "status": status, "stats": stats}))?;
            }
        }
        out.flush()
    }

    fn stream_partial<W: Write>(&mut self, message: &Message, out: &mut W) -> io::Result<()> {
        let content = message.text();
        match &mut self.partial {
            Some((id, streamed))
                if id.as_str() == message.id() && content.starts_with(streamed.as_str()) =>
            {
                out.write_all(content[streamed.len()..].as_bytes())?;
                *streamed = content.to_string();
            }
            partial => {
                if partial.is_some() {
                    writeln!(out)?;
                }
                write!(out, "agent> {content}")?;
                *partial = Some((message.id().to_string(), content.to_string()));
            }
        }
        Ok(())
    }

    fn settle_text<W: Write>(&mut self, message: &Message, out: &mut W) -> io::Result<()> {
        match self.partial.take() {
            Some((id, streamed))
                if id == message.id()
                    && matches!(message.body, MessageBody::LlmResponse { .. })
                    && message.text().starts_with(streamed.as_str()) =>
            {
                let rest = &message.text()[streamed.len()..];
                writeln!(out, "{rest}{}", usage_suffix(message))
            }
            Some(_) => {
                writeln!(out)?;
                writeln!(out, "{}", render_text(message))
            }
            None => writeln!(out, "{}", render_text(message)),
        }
    }
}

fn message_json(message: &Message) -> serde_json::Value {
    serde_json::to_value(message)
        .unwrap_or_else(|e| json!({"kind": "unserializable", "error": e.to_string()}))
}

fn usage_suffix(message: &Message) -> String {
    let MessageBody::LlmResponse {
        usage: Some(usage), ..
    } = &message.body
    else {
        return String::new();
    };
    let mut parts = Vec::new();
    if let Some(tokens) = usage.effective_total_tokens() {
        parts.push(format!("{tokens} tokens"));
    }
    if let Some(cost) = usage.display_cost() {
        parts.push(format!("${cost}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(", "))
    }
}

/// One-line text rendering of a settled message.
pub fn render_text(message: &Message) -> String {
    match &message.body {
        MessageBody::UserMessage { content } => format!("you> {content}"),
        MessageBody::AssistantWelcome { content } => format!("agent> {content}"),
        MessageBody::LlmResponse { content, .. } | MessageBody::LlmChunk { content, .. } => {
            format!("agent> {content}{}", usage_suffix(message))
        }
        MessageBody::ToolCallStarted {
            tool_name,
            arguments,
            ..
        } => {
            if arguments.is_null() {
                format!("  -> {tool_name}")
            } else {
                format!("  -> {tool_name} {arguments}")
            }
        }
        MessageBody::ToolResult {
            tool_name,
            result,
            success,
            execution_time_ms,
            ..
        } => {
            let outcome = if *success { "ok" } else { "failed" };
            let timing = execution_time_ms
                .map(|ms| format!(" ({ms}ms)"))
                .unwrap_or_default();
            let detail = match result {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => format!(": {s}"),
                other => format!(": {other}"),
            };
            format!("  <- {tool_name} {outcome}{timing}{detail}")
        }
        MessageBody::ErrorMessage {
            error,
            retryable,
            auth_error,
            rate_limit_error,
            quota_error,
            model_error,
            network_error,
            ..
        } => {
            let tags: Vec<&str> = [
                (auth_error, "auth"),
                (rate_limit_error, "rate limit"),
                (quota_error, "quota"),
                (model_error, "model"),
                (network_error, "network"),
            ]
            .into_iter()
            .filter(|(flag, _)| **flag == Some(true))
            .map(|(_, tag)| tag)
            .chain((*retryable).then_some("retryable"))
            .collect();
            if tags.is_empty() {
                format!("error: {error}")
            } else {
                format!("error: {error} [{}]", tags.join(", "))
            }
        }
        MessageBody::WorkflowResult {
            content, success, ..
        } => {
            if *success {
                format!("done: {content}")
            } else {
                format!("failed: {content}")
            }
        }
        MessageBody::SystemNote { message, level } => match level {
            NoteLevel::Info => format!("[note] {message}"),
            NoteLevel::Warning => format!("[warning] {message}"),
            NoteLevel::Error => format!("[error] {message}"),
        },
    }
}

pub fn summary_line(status: &TaskStatus, stats: &TranscriptStats) -> String {
    format!(
        "task {} {}: {} responses, {} tool calls ({} failed), {} errors, {} tokens, ${}",
        status.task_id.as_deref().unwrap_or("(unbound)"),
        status.state,
        stats.llm_response_count,
        stats.tool_call_count,
        stats.tool_failure_count,
        stats.error_count,
        stats.total_tokens,
        stats.display_cost(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeck_core::testing::{chunk, error, response, tool_result};
    use agentdeck_core::{TaskState, Transcript};

    fn conversation(messages: Vec<Message>) -> Conversation {
        let mut transcript = Transcript::for_task("t1");
        transcript.messages = messages;
        let mut conversation = Conversation::new();
        conversation.push_segment(transcript);
        conversation
    }

    fn printed(printer: &mut LivePrinter, conversation: &Conversation) -> String {
        let mut out = Vec::new();
        printer.update(conversation, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_streams_open_chunk_then_finishes_line() {
        let mut printer = LivePrinter::new(OutputFormat::Text);
        let user = Message::user("hi");

        let first = printed(
            &mut printer,
            &conversation(vec![user.clone(), chunk("r1", 0, "Hel", false)]),
        );
        assert_eq!(first, "you> hi\nagent> Hel");

        let second = printed(
            &mut printer,
            &conversation(vec![user.clone(), chunk("r1", 1, "Hello", false)]),
        );
        assert_eq!(second, "lo");

        let third = printed(
            &mut printer,
            &conversation(vec![user, response("r1", "Hello!")]),
        );
        assert_eq!(third, "!\n");
    }

    #[test]
    fn jsonl_holds_back_open_chunks() {
        let mut printer = LivePrinter::new(OutputFormat::Jsonl);
        let out = printed(
            &mut printer,
            &conversation(vec![Message::user("hi"), chunk("r1", 0, "Hel", false)]),
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["body"]["kind"], "user_message");
    }

    #[test]
    fn json_prints_one_document_at_finish() {
        let mut printer = LivePrinter::new(OutputFormat::Json);
        let conversation = conversation(vec![Message::user("hi"), response("r1", "Hello")]);
        assert_eq!(printed(&mut printer, &conversation), "");

        let status = TaskStatus {
            task_id: Some("t1".to_string()),
            busy: false,
            state: TaskState::Completed,
        };
        let mut out = Vec::new();
        printer.finish(&conversation, &status, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"]["state"], "completed");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["stats"]["llm_response_count"], 1);
    }

    #[test]
    fn render_text_marks_failures() {
        assert_eq!(
            render_text(&tool_result("search", serde_json::json!("timeout"), false)),
            "  <- search failed: timeout"
        );
        assert!(render_text(&error("boom")).starts_with("error: boom"));
    }

    #[test]
    fn summary_line_reports_state_and_counts() {
        let status = TaskStatus {
            task_id: Some("t1".to_string()),
            busy: false,
            state: TaskState::Failed,
        };
        let line = summary_line(&status, &TranscriptStats::default());
        assert!(line.starts_with("task t1 failed: 0 responses"));
        assert!(line.ends_with("$0.0000"));
    }
}
