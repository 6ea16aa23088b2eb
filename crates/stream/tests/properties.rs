use agentdeck_core::testing::{chunk, response, sse_frame, tool_result, tool_started};
use agentdeck_core::{Message, MessageBody, TaskState, Transcript};
use agentdeck_stream::reduce::{apply, apply_all};
use agentdeck_stream::{
    PumpOutcome, ReplaySource, SessionSnapshot, TaskSession, VisibilityPolicy, pump,
};
use serde_json::{Value, json};
use tokio::sync::watch;

const RESEARCH_TASK: &str = include_str!("fixtures/research_task.sse");
const FAILED_TASK: &str = include_str!("fixtures/failed_task.sse");

fn session() -> TaskSession {
    let mut session = TaskSession::new(VisibilityPolicy::new());
    session.submit("what crates parse SSE?");
    session
}

fn stream(payloads: &[Value]) -> String {
    payloads.iter().map(sse_frame).collect()
}

/// Messages after the user prompt, as (kind, text).
fn entries(session: &TaskSession) -> Vec<(String, String)> {
    session
        .conversation()
        .messages()
        .skip(1)
        .map(|m| (m.kind().to_string(), m.text().to_string()))
        .collect()
}

#[test]
fn ordering_follows_visible_events() {
    let mut session = session();
    session.ingest(
        stream(&[
            json!({"event_type": "connected"}),
            json!({"event_type": "ToolCallStarted", "tool_name": "a"}),
            json!({"ts": 1}),
            json!({"event_type": "SomeInternalEvent"}),
            json!({"event_type": "log", "message": "note"}),
            json!({"event_type": "tool_result", "tool_name": "a", "result": "ok"}),
        ])
        .as_bytes(),
    );

    let kinds: Vec<String> = entries(&session).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["tool_call_started", "system_note", "tool_result"]);
}

#[test]
fn chunks_with_matching_ids_collapse_to_one_message() {
    let pieces = ["The ", "quick ", "brown ", "fox"];
    let last = pieces.len() - 1;
    let events: Vec<Value> = pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            json!({
                "event_type": "LLMCallChunk",
                "response_id": "resp",
                "chunk": piece,
                "chunk_index": i,
                "is_final": i == last
            })
        })
        .collect();

    let mut session = session();
    session.ingest(stream(&events).as_bytes());
    assert_eq!(
        entries(&session),
        vec![("llm_response".to_string(), pieces.concat())]
    );
}

#[test]
fn never_more_than_one_open_chunk() {
    let sequence = vec![
        chunk("A", 0, "a", false),
        chunk("B", 0, "b", false),
        chunk("A", 1, "a2", false),
        tool_started("search", json!({})),
        chunk("C", 0, "c", false),
        chunk("C", 1, "c2", false),
        chunk("D", 0, "d", false),
        response("D", "done"),
        chunk("E", 0, "e", false),
    ];

    let mut transcript = Transcript::new();
    for message in sequence {
        transcript = apply(transcript, message);
        assert!(transcript.open_chunk_count() <= 1);
    }
}

#[test]
fn finalized_messages_stay_unchanged() {
    let sequence = vec![
        tool_started("search", json!({"q": 1})),
        tool_result("search", json!([1, 2]), true),
        chunk("A", 0, "x", false),
        chunk("A", 1, "y", true),
        Message::system_note("between", Default::default()),
        chunk("A", 2, "z", false),
        chunk("B", 0, "open", false),
        response("C", "separate"),
    ];

    let mut transcript = Transcript::new();
    let mut finalized: Vec<Message> = Vec::new();
    for message in sequence {
        transcript = apply(transcript, message);
        assert_eq!(&transcript.messages()[..finalized.len()], &finalized[..]);
        finalized = transcript
            .messages()
            .iter()
            .take_while(|m| !m.is_open_chunk())
            .cloned()
            .collect();
    }
}

#[test]
fn terminal_event_clears_busy_even_when_mapping_is_empty() {
    let mut session = session();
    session.bind_task("t1");
    assert!(session.status().busy);

    session.ingest(sse_frame(&json!({"event_type": "WorkflowCompleted"})).as_bytes());
    assert!(!session.status().busy);

    session.ingest(sse_frame(&json!({"event_type": "error", "message": "late"})).as_bytes());
    assert!(!session.status().busy);
    assert_eq!(session.state(), TaskState::Completed);
}

#[test]
fn malformed_frame_between_good_frames_is_dropped() {
    let mut bytes = sse_frame(&json!({"event_type": "ToolCallStarted", "tool_name": "a"}));
    bytes += "data: {\"event_type\": \"ToolCallStarted\", \"tool_name\": \n\n";
    bytes += &sse_frame(&json!({"event_type": "tool_result", "tool_name": "a"}));

    let mut session = session();
    let report = session.ingest(bytes.as_bytes());
    assert_eq!(report.decode_errors, 1);
    let kinds: Vec<String> = entries(&session).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["tool_call_started", "tool_result"]);
}

#[test]
fn two_chunks_become_one_response() {
    let transcript = apply_all(
        Transcript::new(),
        [chunk("A", 0, "Hel", false), chunk("A", 1, "lo!", true)],
    );
    assert_eq!(transcript.len(), 1);
    let message = &transcript.messages()[0];
    assert_eq!(message.id(), "A");
    assert!(matches!(
        &message.body,
        MessageBody::LlmResponse { content, .. } if content == "Hello!"
    ));
}

#[test]
fn tool_round_trip_then_completion() {
    let mut session = session();
    session.bind_task("t1");
    session.ingest(
        stream(&[
            json!({"event_type": "ToolCallStarted", "tool_name": "search"}),
            json!({"event_type": "ToolCallCompleted", "tool_name": "search", "success": true}),
        ])
        .as_bytes(),
    );
    assert!(session.status().busy);

    session.ingest(sse_frame(&json!({"event_type": "WorkflowCompleted", "result": "Done"})).as_bytes());
    assert_eq!(
        entries(&session),
        vec![
            ("tool_call_started".to_string(), "search".to_string()),
            ("tool_result".to_string(), "search".to_string()),
            ("workflow_result".to_string(), "Done".to_string()),
        ]
    );
    assert!(!session.status().busy);
}

#[test]
fn event_less_message_frame_changes_nothing() {
    let mut session = session();
    session.bind_task("t1");
    let before = session.snapshot();

    let report = session.ingest(b"data: {\"timestamp\": \"2026-03-01T10:00:00Z\"}\n\n");
    assert_eq!(report.applied, 0);
    assert_eq!(session.snapshot(), before);
}

#[test]
fn research_fixture_replays_to_expected_transcript() {
    let mut session = session();
    let report = session.ingest(RESEARCH_TASK.as_bytes());
    assert_eq!(report.decode_errors, 1);
    assert!(report.close_stream);

    assert_eq!(
        entries(&session),
        vec![
            ("tool_call_started".to_string(), "web_search".to_string()),
            ("tool_result".to_string(), "web_search".to_string()),
            (
                "llm_response".to_string(),
                "Found three candidate crates.".to_string()
            ),
            (
                "workflow_result".to_string(),
                "Found three candidate crates.".to_string()
            ),
        ]
    );
    let status = session.status();
    assert_eq!(status.task_id.as_deref(), Some("task-7f3a"));
    assert_eq!(status.state, TaskState::Completed);
    assert!(!status.busy);
}

#[tokio::test]
async fn failed_fixture_pumps_to_failed_state() {
    let mut session = session();
    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    let (snap_tx, snap_rx) = watch::channel(SessionSnapshot::default());

    let outcome = pump(
        ReplaySource::new(FAILED_TASK, 16),
        &mut session,
        &mut cancel_rx,
        &snap_tx,
    )
    .await;
    assert_eq!(outcome, PumpOutcome::Closed(TaskState::Failed));

    let snapshot = snap_rx.borrow().clone();
    assert!(!snapshot.status.busy);
    let kinds: Vec<&str> = snapshot.conversation.messages().map(Message::kind).collect();
    assert_eq!(
        kinds,
        vec!["user_message", "llm_response", "error_message", "workflow_result"]
    );
    let last = snapshot.conversation.messages().last().cloned();
    assert!(matches!(
        last.map(|m| m.body),
        Some(MessageBody::WorkflowResult { success: false, .. })
    ));
}
