//! Transcript reducer.
//!
//! `apply` is a pure fold: it takes the transcript by value and returns the
//! next one. The only entry ever rewritten is the trailing open chunk; every
//! other message is left exactly as it was appended.

use agentdeck_core::{Message, MessageBody, Transcript};
use tracing::{debug, warn};

/// Apply one message to a transcript.
pub fn apply(mut transcript: Transcript, message: Message) -> Transcript {
    if transcript.frozen {
        warn!(
            "Dropping {} '{}' for a frozen transcript",
            message.kind(),
            message.id()
        );
        return transcript;
    }

    if message.is_chunk() {
        return apply_chunk(transcript, message);
    }

    if matches!(message.body, MessageBody::LlmResponse { .. })
        && open_chunk_matches(&transcript, message.id())
    {
        debug!("Response '{}' supersedes its open chunk stream", message.id());
        transcript.messages.pop();
    } else {
        finalize_open_chunk(&mut transcript);
    }
    transcript.messages.push(message);
    transcript
}

/// Fold a sequence of messages.
pub fn apply_all<I>(transcript: Transcript, messages: I) -> Transcript
where
    I: IntoIterator<Item = Message>,
{
    messages.into_iter().fold(transcript, apply)
}

/// Settle the transcript once its stream is over. A trailing open chunk
/// becomes a response; the transcript stays writable.
pub fn finalize(mut transcript: Transcript) -> Transcript {
    finalize_open_chunk(&mut transcript);
    transcript
}

/// Close the transcript: finalize any open chunk and freeze it.
pub fn seal(mut transcript: Transcript) -> Transcript {
    finalize_open_chunk(&mut transcript);
    transcript.frozen = true;
    transcript
}

fn apply_chunk(mut transcript: Transcript, message: Message) -> Transcript {
    let Message { envelope, body } = message;
    let MessageBody::LlmChunk {
        content: piece,
        chunk_index,
        is_final,
        response_scoped,
    } = body
    else {
        return transcript;
    };
    let stream_id = envelope.id.clone();

    if transcript.is_sealed(&stream_id) {
        warn!("Dropping chunk {chunk_index} for finalized stream '{stream_id}'");
        return transcript;
    }

    let open = transcript
        .messages
        .last()
        .filter(|last| last.is_open_chunk() && last.id() == stream_id)
        .and_then(|last| match &last.body {
            MessageBody::LlmChunk {
                content,
                chunk_index,
                ..
            } => Some((content.clone(), *chunk_index)),
            _ => None,
        });

    match open {
        Some((_, open_index)) if is_replay(chunk_index, open_index, is_final) => {
            warn!(
                "Dropping replayed chunk {chunk_index} for stream '{stream_id}' (open at {open_index})"
            );
            return transcript;
        }
        Some((accumulated, _)) => {
            if let Some(last) = transcript.messages.last_mut() {
                last.body = MessageBody::LlmChunk {
                    content: accumulated + &piece,
                    chunk_index,
                    is_final,
                    response_scoped,
                };
            }
        }
        None => {
            finalize_open_chunk(&mut transcript);
            transcript.messages.push(Message::new(
                envelope,
                MessageBody::LlmChunk {
                    content: piece,
                    chunk_index,
                    is_final,
                    response_scoped,
                },
            ));
        }
    }

    if is_final {
        promote_last_chunk(&mut transcript);
        if response_scoped {
            transcript.sealed_stream_ids.insert(stream_id);
        }
    }
    transcript
}

/// A chunk at or before the open index was already applied. Index 0 repeats
/// are accepted since streams without indices report 0 for every chunk.
fn is_replay(index: u64, open_index: u64, is_final: bool) -> bool {
    index < open_index || (index == open_index && index > 0 && !is_final)
}

fn open_chunk_matches(transcript: &Transcript, id: &str) -> bool {
    transcript
        .open_chunk()
        .is_some_and(|open| open.id() == id)
}

/// Turn a trailing open chunk into a response with its accumulated content.
fn finalize_open_chunk(transcript: &mut Transcript) {
    if transcript.open_chunk().is_some() {
        debug!(
            "Finalizing open chunk stream '{}' before next message",
            transcript.last().map(Message::id).unwrap_or_default()
        );
        promote_last_chunk(transcript);
    }
}

fn promote_last_chunk(transcript: &mut Transcript) {
    let Some(last) = transcript.messages.last_mut() else {
        return;
    };
    let content = match &mut last.body {
        MessageBody::LlmChunk { content, .. } => std::mem::take(content),
        _ => return,
    };
    last.body = MessageBody::LlmResponse {
        content,
        role: Some("assistant".to_string()),
        tool_calls: None,
        usage: None,
    };
}
