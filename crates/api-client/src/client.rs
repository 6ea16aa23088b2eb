use std::future::Future;
use std::time::Duration;

use agentdeck_stream::{ByteSource, TransportError};
use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::retry::{RetryConfig, retry_post};
use crate::types::{CreateTaskRequest, CreateTaskResponse};

const EVENT_STREAM: &str = "text/event-stream";
const TASK_ID_HEADER: &str = "x-task-id";

/// Typed HTTP client for the agentdeck task API.
///
/// Plain requests use the full request timeout. Streaming requests use a
/// client with only a connect timeout so long-running tasks are not cut off.
pub struct ApiClient {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(base_url: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build streaming HTTP client")?;
        Ok(Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_auth(&mut self, token: String) {
        self.auth_token = Some(token).filter(|t| !t.trim().is_empty());
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    // ── Tasks ─────────────────────────────────────────────────────────────

    /// `POST /api/tasks`, retried on network errors and 5xx.
    pub async fn create_task(&self, req: &CreateTaskRequest) -> Result<CreateTaskResponse> {
        let body = serde_json::to_value(req).context("Failed to encode task request")?;
        let resp = retry_post(
            &self.client,
            &self.url("/tasks"),
            self.auth_token.as_deref(),
            &body,
            &self.retry,
        )
        .await?;
        let created: CreateTaskResponse = parse_response(resp).await?;
        info!("Created task '{}'", created.task_id);
        Ok(created)
    }

    /// `GET /api/tasks/{id}/events`: attach to a task's event stream.
    pub async fn task_events(&self, task_id: &str) -> Result<TaskEventStream> {
        let req = self
            .stream_client
            .get(self.url(&format!("/tasks/{task_id}/events")))
            .header(reqwest::header::ACCEPT, EVENT_STREAM);
        let resp = self
            .authorize(req)
            .send()
            .await
            .with_context(|| format!("Failed to open event stream for task '{task_id}'"))?;
        TaskEventStream::open(resp, Some(task_id.to_string())).await
    }

    /// `POST /api/tasks/stream`: create a task whose response body is its
    /// event stream.
    pub async fn create_task_streaming(&self, req: &CreateTaskRequest) -> Result<TaskEventStream> {
        let request = self
            .stream_client
            .post(self.url("/tasks/stream"))
            .header(reqwest::header::ACCEPT, EVENT_STREAM)
            .json(req);
        let resp = self
            .authorize(request)
            .send()
            .await
            .context("Failed to start streaming task")?;
        TaskEventStream::open(resp, None).await
    }

    /// `POST /api/tasks/{id}/cancel`.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let req = self.client.post(self.url(&format!("/tasks/{task_id}/cancel")));
        let resp = self
            .authorize(req)
            .send()
            .await
            .with_context(|| format!("Failed to cancel task '{task_id}'"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("{status}: {body}");
        }
        info!("Cancelled task '{task_id}'");
        Ok(())
    }
}

/// An open SSE response body. Dropping it closes the connection.
pub struct TaskEventStream {
    response: reqwest::Response,
    task_id: Option<String>,
}

impl TaskEventStream {
    async fn open(response: reqwest::Response, task_id: Option<String>) -> Result<Self> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        let task_id = task_id.or_else(|| {
            response
                .headers()
                .get(TASK_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        });
        debug!(
            "Event stream open (task {})",
            task_id.as_deref().unwrap_or("pending")
        );
        Ok(Self { response, task_id })
    }

    /// Task id, when known from the request path or an `X-Task-Id` header.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }
}

impl ByteSource for TaskEventStream {
    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = std::result::Result<Option<Vec<u8>>, TransportError>> + Send {
        async move {
            self.response
                .chunk()
                .await
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .map_err(|e| TransportError::Connection(e.to_string()))
        }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {body}");
    }
    Ok(resp.json().await?)
}
