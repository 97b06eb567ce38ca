use serde::{Deserialize, Serialize};

use crate::constants::{
    CHAT_FREE_LIMIT, DEFAULT_API_BASE, POLL_INTERVAL_MS, POLL_MAX_ATTEMPTS, QUOTA_STORAGE_KEY,
    THREAD_STORAGE_KEY, TOKEN_MODE_ANON, TOKEN_SAFETY_MARGIN_SECONDS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Sent as `mode` in the token request body.
    pub mode: String,
    /// Subtracted from `expires_in` before the cached token is considered stale.
    pub token_safety_margin_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: TOKEN_MODE_ANON.to_string(),
            token_safety_margin_seconds: TOKEN_SAFETY_MARGIN_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: POLL_MAX_ATTEMPTS,
            interval_ms: POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Daily free questions. Advisory only; the backend holds the real limit.
    pub free_limit: u32,
    pub quota_key: String,
    pub thread_key: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            free_limit: CHAT_FREE_LIMIT,
            quota_key: QUOTA_STORAGE_KEY.to_string(),
            thread_key: THREAD_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_seconds: u64,
    /// Applied to plain requests only. The event stream has no total timeout.
    pub request_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    pub auth: AuthConfig,
    pub polling: PollingConfig,
    pub chat: ChatConfig,
    pub http: HttpConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ClientConfig {
    pub fn default_config() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            auth: AuthConfig::default(),
            polling: PollingConfig::default(),
            chat: ChatConfig::default(),
            http: HttpConfig::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let cfg: ClientConfig = toml::from_str(
            r#"
api_base = "https://api.example.com"

[polling]
interval_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(cfg.api_base, "https://api.example.com");
        assert_eq!(cfg.polling.interval_ms, 250);
        assert_eq!(cfg.polling.max_attempts, 30);
        assert_eq!(cfg.auth.mode, "anon");
        assert_eq!(cfg.auth.token_safety_margin_seconds, 5);
        assert_eq!(cfg.chat.free_limit, 3);
        assert_eq!(cfg.chat.quota_key, "cgpt_free_quota_v1");
        assert_eq!(cfg.chat.thread_key, "cgpt_thread_id");
    }

    #[test]
    fn default_config_survives_toml_round_trip() {
        let txt = toml::to_string_pretty(&ClientConfig::default_config()).unwrap();
        let back: ClientConfig = toml::from_str(&txt).unwrap();
        assert_eq!(back.api_base, "http://127.0.0.1:8000");
        assert_eq!(back.http.request_timeout_seconds, 60);
    }
}
