use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use super::config::ClientConfig;
use super::diagnostics::format_reqwest_error_for_logs;
use super::error::{ClientError, ClientResult};
use super::upstream::build_upstream_url;
use super::unix_ms;

pub const TOKEN_PATH: &str = "/auth/token";

/// Short-lived bearer credential. Lives in process memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    expires_at_unix_ms: Option<u64>,
}

impl Credential {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// `None` when the backend did not send `expires_in`; such a token is kept until replaced.
    pub fn expires_at_unix_ms(&self) -> Option<u64> {
        self.expires_at_unix_ms
    }

    pub fn is_live_at(&self, now_unix_ms: u64) -> bool {
        self.expires_at_unix_ms.map_or(true, |t| now_unix_ms < t)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"REDACTED")
            .field("expires_at_unix_ms", &self.expires_at_unix_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
}

fn expiry_for(now_unix_ms: u64, expires_in: Option<f64>, safety_margin_seconds: u64) -> Option<u64> {
    let secs = expires_in.filter(|s| s.is_finite() && *s != 0.0)?;
    let ttl_secs = (secs - safety_margin_seconds as f64).max(1.0);
    Some(now_unix_ms.saturating_add((ttl_secs * 1000.0) as u64))
}

pub struct TokenManager {
    http: reqwest::Client,
    api_base: String,
    mode: String,
    safety_margin_seconds: u64,
    request_timeout: Duration,
    cached: Mutex<Option<Credential>>,
    // Held across the token request so concurrent callers share one acquisition.
    acquire: tokio::sync::Mutex<()>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, cfg: &ClientConfig) -> Self {
        Self {
            http,
            api_base: cfg.api_base.clone(),
            mode: cfg.auth.mode.clone(),
            safety_margin_seconds: cfg.auth.token_safety_margin_seconds,
            request_timeout: Duration::from_secs(cfg.http.request_timeout_seconds),
            cached: Mutex::new(None),
            acquire: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn ensure_token(&self) -> ClientResult<Credential> {
        self.ensure_token_at(unix_ms()).await
    }

    pub async fn ensure_token_at(&self, now_unix_ms: u64) -> ClientResult<Credential> {
        if let Some(c) = self.current_at(now_unix_ms) {
            log::debug!("reusing cached token");
            return Ok(c);
        }

        let _guard = self.acquire.lock().await;
        if let Some(c) = self.current_at(now_unix_ms) {
            return Ok(c);
        }

        let credential = self.acquire_at(now_unix_ms).await?;
        *self.cached.lock() = Some(credential.clone());
        Ok(credential)
    }

    /// Cached credential if it has not expired. Never touches the network.
    pub fn current(&self) -> Option<Credential> {
        self.current_at(unix_ms())
    }

    pub fn current_at(&self, now_unix_ms: u64) -> Option<Credential> {
        let mut guard = self.cached.lock();
        match guard.as_ref() {
            Some(c) if c.is_live_at(now_unix_ms) => Some(c.clone()),
            Some(_) => {
                log::debug!("cached token expired");
                *guard = None;
                None
            }
            None => None,
        }
    }

    pub fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            log::debug!("cached token invalidated");
        }
    }

    /// Drops the cached credential only if it is still `stale`. A token another caller
    /// acquired in the meantime is kept.
    pub fn invalidate_if(&self, stale: &Credential) {
        let mut guard = self.cached.lock();
        if guard.as_ref() == Some(stale) {
            *guard = None;
            log::debug!("rejected token invalidated");
        }
    }

    async fn acquire_at(&self, now_unix_ms: u64) -> ClientResult<Credential> {
        let url = build_upstream_url(&self.api_base, TOKEN_PATH);
        let res = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(&json!({ "mode": self.mode }))
            .send()
            .await
            .map_err(|e| ClientError::Auth(format_reqwest_error_for_logs(&e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let parsed: TokenResponse = res
            .json()
            .await
            .map_err(|e| ClientError::Auth(format!("malformed token response: {e}")))?;
        let Some(value) = parsed
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
        else {
            return Err(ClientError::Auth(
                "token response is missing `token`".to_string(),
            ));
        };

        let expires_at_unix_ms =
            expiry_for(now_unix_ms, parsed.expires_in, self.safety_margin_seconds);
        log::info!(
            "acquired {} token (expires_in={:?})",
            self.mode,
            parsed.expires_in
        );
        Ok(Credential {
            value,
            expires_at_unix_ms,
        })
    }
}
