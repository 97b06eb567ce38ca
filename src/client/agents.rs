use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ClientResult;
use super::upstream::ApiClient;

pub const AGENTS_INVOKE_PATH: &str = "/agents/invoke";

/// What the UI shows when an invocation fails for any reason.
pub const AGENT_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable. Please try again.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInvocation {
    #[serde(
        default,
        rename = "taskId",
        alias = "task_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct AgentClient {
    api: ApiClient,
}

impl AgentClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn invoke(&self, agent: &str, input: Value) -> ClientResult<AgentInvocation> {
        let body = json!({ "agent": agent, "input": input });
        let out: AgentInvocation = self.api.post_json(AGENTS_INVOKE_PATH, &body).await?;
        log::info!(
            "agent {agent} invoked (task={}, status={})",
            out.task_id.as_deref().unwrap_or("-"),
            out.status.as_deref().unwrap_or("-")
        );
        Ok(out)
    }
}
