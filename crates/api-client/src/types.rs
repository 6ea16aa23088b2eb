use serde::{Deserialize, Serialize};

/// Body of `POST /api/tasks` and `POST /api/tasks/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub prompt: String,
}

impl CreateTaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            prompt: prompt.into(),
        }
    }

    /// Target a specific agent; blank ids fall back to the server default.
    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id.filter(|id| !id.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    #[serde(alias = "id")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
