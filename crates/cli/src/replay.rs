use std::path::Path;

use agentdeck_stream::{ReplaySource, TaskSession};
use anyhow::{Context, Result};
use tracing::info;

use crate::config::{load_config, visibility_policy};
use crate::follow::{conclude, follow};
use crate::output::{LivePrinter, OutputFormat};

/// Feed a captured SSE stream through the live pipeline.
pub async fn run_replay(
    file: &Path,
    chunk_bytes: Option<usize>,
    prompt: Option<&str>,
    format: OutputFormat,
    archive: Option<&Path>,
) -> Result<i32> {
    let config = load_config()?;
    let data = std::fs::read(file)
        .with_context(|| format!("Failed to read capture at {}", file.display()))?;
    let chunk_bytes = chunk_bytes.unwrap_or(config.stream.replay_chunk_bytes);
    info!(
        "Replaying {} bytes from {} in {chunk_bytes}-byte reads",
        data.len(),
        file.display()
    );

    let mut session = TaskSession::new(visibility_policy(&config));
    session.open(None);
    if let Some(prompt) = prompt {
        session.submit(prompt);
    }

    let mut printer = LivePrinter::new(format);
    let outcome = follow(ReplaySource::new(data, chunk_bytes), &mut session, &mut printer).await?;
    conclude(&session, &mut printer, &outcome, archive)
}
