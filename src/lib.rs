pub mod app_state;
pub mod client;
pub mod constants;

pub use app_state::{build_state, build_state_from_config, load_or_init_config, ClientState};
pub use client::agents::{AgentClient, AgentInvocation};
pub use client::chat::{ChatReply, ChatSession, ChatUsage};
pub use client::config::ClientConfig;
pub use client::error::{ClientError, ClientResult};
pub use client::events::{EventSubscriber, StreamHandle};
pub use client::quota::{QuotaRecord, QuotaTracker};
pub use client::site::SiteClient;
pub use client::storage::{FileKvStore, KvStore, MemoryKvStore};
pub use client::tasks::{PollOptions, Task, TaskPoller, TaskStatus};
pub use client::token::{Credential, TokenManager};
pub use client::upstream::{ApiClient, ApiResponse, HealthStatus};
