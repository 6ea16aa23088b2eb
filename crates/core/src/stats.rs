use crate::message::MessageBody;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

/// Aggregate statistics computed from a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptStats {
    pub message_count: u64,
    pub llm_response_count: u64,
    pub tool_call_count: u64,
    pub tool_result_count: u64,
    pub tool_failure_count: u64,
    pub error_count: u64,
    pub total_tokens: u64,
    /// Sum of response costs, or the workflow's reported total when larger.
    pub total_cost: f64,
}

impl TranscriptStats {
    pub fn compute(transcript: &Transcript) -> Self {
        let mut stats = Self::default();
        let mut response_cost = 0.0f64;
        let mut workflow_cost: Option<f64> = None;

        for message in transcript.messages() {
            stats.message_count += 1;
            match &message.body {
                MessageBody::LlmResponse { usage, .. } => {
                    stats.llm_response_count += 1;
                    if let Some(usage) = usage {
                        stats.total_tokens += usage.effective_total_tokens().unwrap_or(0);
                        response_cost += usage.cost.unwrap_or(0.0);
                    }
                }
                MessageBody::ToolCallStarted { .. } => stats.tool_call_count += 1,
                MessageBody::ToolResult { success, .. } => {
                    stats.tool_result_count += 1;
                    if !success {
                        stats.tool_failure_count += 1;
                    }
                }
                MessageBody::ErrorMessage { .. } => stats.error_count += 1,
                MessageBody::WorkflowResult { total_cost, .. } => {
                    if let Some(cost) = total_cost {
                        workflow_cost = Some(workflow_cost.unwrap_or(0.0).max(*cost));
                    }
                }
                _ => {}
            }
        }

        stats.total_cost = match workflow_cost {
            Some(cost) => cost.max(response_cost),
            None => response_cost,
        };
        stats
    }

    /// Cost rendered with 4 decimals.
    pub fn display_cost(&self) -> String {
        format!("{:.4}", self.total_cost)
    }
}
