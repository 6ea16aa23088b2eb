use std::io::{self, BufWriter, Write};
use std::path::Path;

use agentdeck_core::TaskState;
use agentdeck_core::jsonl::write_jsonl;
use agentdeck_stream::{ByteSource, PumpOutcome, TaskSession, pump};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::output::LivePrinter;

/// Pump `source` into `session`, printing every published snapshot.
/// Ctrl-C cancels the pump and releases the stream.
pub async fn follow<S: ByteSource>(
    source: S,
    session: &mut TaskSession,
    printer: &mut LivePrinter,
) -> Result<PumpOutcome> {
    let mut out = io::stdout();
    printer.update(session.conversation(), &mut out)?;

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling stream");
            cancel_tx.send_replace(true);
        }
    });

    let (snapshots, mut updates) = watch::channel(session.snapshot());
    let outcome = {
        let pumping = pump(source, session, &mut cancel_rx, &snapshots);
        tokio::pin!(pumping);
        loop {
            tokio::select! {
                outcome = &mut pumping => break outcome,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break (&mut pumping).await;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    printer.update(&snapshot.conversation, &mut out)?;
                }
            }
        }
    };
    ctrl_c.abort();

    info!("Stream finished: {outcome:?}");
    Ok(outcome)
}

/// Print the final transcript state, write the archive if requested and
/// return the process exit code.
pub fn conclude(
    session: &TaskSession,
    printer: &mut LivePrinter,
    outcome: &PumpOutcome,
    archive: Option<&Path>,
) -> Result<i32> {
    let mut out = io::stdout();
    printer.finish(session.conversation(), &session.status(), &mut out)?;

    if let Some(path) = archive {
        write_archive(session, path)?;
        eprintln!("Transcript archived to {}", path.display());
    }

    Ok(exit_code(outcome, session.state()))
}

fn write_archive(session: &TaskSession, path: &Path) -> Result<()> {
    let transcript = session
        .conversation()
        .current()
        .context("No task transcript to archive")?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create archive at {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_jsonl(transcript, session.state(), &mut writer)
        .with_context(|| format!("Failed to write archive at {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn exit_code(outcome: &PumpOutcome, state: TaskState) -> i32 {
    match outcome {
        PumpOutcome::Cancelled => 130,
        PumpOutcome::TransportFailed(_) => 1,
        _ if state == TaskState::Failed => 1,
        _ => 0,
    }
}
