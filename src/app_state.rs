use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::client::agents::AgentClient;
use crate::client::chat::ChatSession;
use crate::client::config::ClientConfig;
use crate::client::events::EventSubscriber;
use crate::client::quota::QuotaTracker;
use crate::client::site::SiteClient;
use crate::client::storage::{FileKvStore, KvStore};
use crate::client::tasks::{PollOptions, TaskPoller};
use crate::client::token::TokenManager;
use crate::client::upstream::{build_http_client, ApiClient};

/// Every component shares one `reqwest::Client` and one `TokenManager`.
#[derive(Clone)]
pub struct ClientState {
    pub config: ClientConfig,
    pub tokens: Arc<TokenManager>,
    pub api: ApiClient,
    pub tasks: TaskPoller,
    pub events: EventSubscriber,
    pub quota: QuotaTracker,
    pub chat: ChatSession,
    pub agents: AgentClient,
    pub site: SiteClient,
}

pub fn load_or_init_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if path.exists() {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: ClientConfig =
            toml::from_str(&txt).with_context(|| format!("parse config {}", path.display()))?;
        return Ok(cfg);
    }
    let cfg = ClientConfig::default_config();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, toml::to_string_pretty(&cfg)?)
        .with_context(|| format!("write default config {}", path.display()))?;
    log::info!("wrote default config to {}", path.display());
    Ok(cfg)
}

pub fn build_state_from_config(
    cfg: ClientConfig,
    store: Arc<dyn KvStore>,
) -> anyhow::Result<ClientState> {
    let http = build_http_client(&cfg.http).context("build http client")?;
    let tokens = Arc::new(TokenManager::new(http.clone(), &cfg));
    let api = ApiClient::new(http.clone(), tokens.clone(), &cfg);
    let tasks = TaskPoller::new(api.clone(), PollOptions::from(&cfg.polling));
    let events = EventSubscriber::new(http, tokens.clone(), &cfg);
    let quota = QuotaTracker::new(store, &cfg.chat);
    let chat = ChatSession::new(api.clone(), quota.clone());
    let agents = AgentClient::new(api.clone());
    let site = SiteClient::new(api.clone());
    Ok(ClientState {
        config: cfg,
        tokens,
        api,
        tasks,
        events,
        quota,
        chat,
        agents,
        site,
    })
}

pub fn build_state(config_path: &Path, storage_path: &Path) -> anyhow::Result<ClientState> {
    let cfg = load_or_init_config(config_path)?;
    let store = FileKvStore::new(storage_path.to_path_buf());
    build_state_from_config(cfg, Arc::new(store))
}
