use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::config::PollingConfig;
use super::error::{ClientError, ClientResult};
use super::upstream::ApiClient;

pub const TASKS_PATH: &str = "/tasks";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Done,
    Error,
    /// Anything that is not terminal, including statuses this client does not know.
    #[default]
    #[serde(other)]
    Pending,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Snapshot of a backend task as returned by `GET /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            interval: Duration::from_millis(cfg.interval_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmittedTask {
    #[serde(default)]
    id: String,
}

fn task_path(id: &str) -> String {
    format!("{TASKS_PATH}/{}", urlencoding::encode(id))
}

/// Submits work and polls it at a fixed interval until it reaches a terminal state.
///
/// Poll attempts are strictly sequential. Transport and HTTP failures during polling
/// propagate immediately; retrying them is left to the caller.
#[derive(Clone)]
pub struct TaskPoller {
    api: ApiClient,
    options: PollOptions,
}

impl TaskPoller {
    pub fn new(api: ApiClient, options: PollOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    pub async fn submit(&self, kind: &str, data: &BTreeMap<String, String>) -> ClientResult<String> {
        let body = json!({ "kind": kind, "data": data });
        let submitted: SubmittedTask = self.api.post_json(TASKS_PATH, &body).await?;
        let id = submitted.id.trim().to_string();
        if id.is_empty() {
            return Err(ClientError::Decode {
                path: TASKS_PATH.to_string(),
                message: "submission response is missing `id`".to_string(),
            });
        }
        log::info!("submitted {kind} task {id}");
        Ok(id)
    }

    pub async fn fetch(&self, id: &str) -> ClientResult<Task> {
        let mut task: Task = self.api.get_json(&task_path(id)).await?;
        if task.id.is_empty() {
            task.id = id.to_string();
        }
        Ok(task)
    }

    pub async fn await_task(&self, id: &str, options: PollOptions) -> ClientResult<Task> {
        for attempt in 1..=options.max_attempts {
            let task = self.fetch(id).await?;
            match task.status {
                TaskStatus::Done => {
                    log::info!("task {id} done after {attempt} poll(s)");
                    return Ok(task);
                }
                TaskStatus::Error => {
                    let message = task
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| "task failed".to_string());
                    log::info!("task {id} failed: {message}");
                    return Err(ClientError::Task {
                        task_id: id.to_string(),
                        message,
                    });
                }
                TaskStatus::Pending => {
                    log::debug!("task {id} pending ({attempt}/{})", options.max_attempts);
                    if attempt < options.max_attempts {
                        tokio::time::sleep(options.interval).await;
                    }
                }
            }
        }
        Err(ClientError::Timeout {
            task_id: id.to_string(),
            attempts: options.max_attempts,
        })
    }

    pub async fn submit_and_await(
        &self,
        kind: &str,
        data: &BTreeMap<String, String>,
    ) -> ClientResult<Task> {
        self.submit_and_await_with(kind, data, self.options).await
    }

    pub async fn submit_and_await_with(
        &self,
        kind: &str,
        data: &BTreeMap<String, String>,
        options: PollOptions,
    ) -> ClientResult<Task> {
        let id = self.submit(kind, data).await?;
        self.await_task(&id, options).await
    }
}
