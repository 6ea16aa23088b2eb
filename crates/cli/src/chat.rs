use std::path::Path;

use agentdeck_api_client::{ApiClient, CreateTaskRequest, RetryConfig};
use agentdeck_core::Message;
use agentdeck_runtime_config::DeckConfig;
use agentdeck_stream::{PumpOutcome, TaskSession};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{load_config, visibility_policy};
use crate::follow::{conclude, follow};
use crate::output::{LivePrinter, OutputFormat};

fn api_client(config: &DeckConfig) -> Result<ApiClient> {
    let mut api = ApiClient::new(
        &config.server.url,
        config.stream.connect_timeout(),
        config.stream.request_timeout(),
    )?
    .with_retry(RetryConfig::with_max_retries(config.stream.max_retries as usize));
    api.set_auth(config.server.api_key.clone());
    Ok(api)
}

/// Start a task from `prompt` and follow it to the end.
///
/// With `inline`, the task is created with a single streaming request and
/// its id is learned from the response header or the `task_created` event.
pub async fn run_chat(
    prompt: &str,
    agent: Option<String>,
    inline: bool,
    format: OutputFormat,
    archive: Option<&Path>,
) -> Result<i32> {
    let config = load_config()?;
    let api = api_client(&config)?;
    let agent = agent.or_else(|| config.chat.agent().map(str::to_string));

    let mut session = TaskSession::new(visibility_policy(&config));
    let welcome = config
        .chat
        .show_welcome
        .then(|| Message::welcome(agent.clone(), config.chat.welcome_message.clone()));
    session.open(welcome);
    session.submit(prompt);

    let request = CreateTaskRequest::new(prompt).with_agent(agent);
    let stream = if inline {
        let stream = api.create_task_streaming(&request).await?;
        if let Some(task_id) = stream.task_id() {
            session.bind_task(task_id);
        }
        stream
    } else {
        let created = api
            .create_task(&request)
            .await
            .context("Failed to create task")?;
        session.bind_task(&created.task_id);
        api.task_events(&created.task_id).await?
    };

    let mut printer = LivePrinter::new(format);
    let outcome = follow(stream, &mut session, &mut printer).await?;
    if outcome == PumpOutcome::Cancelled {
        cancel_remote(&api, &session).await;
    }
    conclude(&session, &mut printer, &outcome, archive)
}

/// Attach to a task that is already running.
pub async fn run_watch(task_id: &str, format: OutputFormat, archive: Option<&Path>) -> Result<i32> {
    let config = load_config()?;
    let api = api_client(&config)?;

    let mut session = TaskSession::new(visibility_policy(&config));
    session.open(None);
    session.attach(task_id);
    info!("Watching task '{task_id}'");

    let stream = api.task_events(task_id).await?;
    let mut printer = LivePrinter::new(format);
    let outcome = follow(stream, &mut session, &mut printer).await?;
    if outcome == PumpOutcome::Cancelled {
        cancel_remote(&api, &session).await;
    }
    conclude(&session, &mut printer, &outcome, archive)
}

async fn cancel_remote(api: &ApiClient, session: &TaskSession) {
    let Some(task_id) = session.status().task_id else {
        eprintln!("Stopped before the server assigned a task id.");
        return;
    };
    match api.cancel_task(&task_id).await {
        Ok(()) => eprintln!("Cancelled task {task_id}."),
        Err(e) => warn!("Failed to cancel task '{task_id}': {e:#}"),
    }
}
