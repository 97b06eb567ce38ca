use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::config::{ClientConfig, HttpConfig};
use super::error::{ClientError, ClientResult};
use super::token::TokenManager;
use crate::constants::CLIENT_USER_AGENT;

pub const HEALTH_PATH: &str = "/health";

pub fn build_upstream_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let rel = path.trim_start_matches('/');
    format!("{}/{}", base, rel)
}

/// Shared by token acquisition, requests and event streams. No total timeout is set here;
/// plain requests apply `request_timeout_seconds` per call so streams can stay open.
pub fn build_http_client(http: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .connect_timeout(Duration::from_secs(http.connect_timeout_seconds))
        .build()
}

/// Success body, negotiated by response content-type.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    Text(String),
}

impl ApiResponse {
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            Self::Text(t) => t.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Up(String),
    Down,
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up(_))
    }
}

fn merge_caller_headers(headers: &mut HeaderMap, extra: &HeaderMap) {
    for key in extra.keys() {
        headers.remove(key);
        for value in extra.get_all(key) {
            headers.append(key.clone(), value.clone());
        }
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

fn decode_response<T: DeserializeOwned>(path: &str, resp: ApiResponse) -> ClientResult<T> {
    let value = match resp {
        ApiResponse::Json(v) => v,
        // Some backends send JSON with a text/plain content-type.
        ApiResponse::Text(t) => serde_json::from_str(&t).map_err(|_| ClientError::Decode {
            path: path.to_string(),
            message: format!("expected JSON, got text ({} bytes)", t.len()),
        })?,
    };
    serde_json::from_value(value).map_err(|e| ClientError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Authenticated JSON client. Every call goes through `TokenManager::ensure_token` first.
///
/// Header precedence: `Content-Type: application/json` and `Authorization: Bearer <token>`
/// are set first, then caller headers are merged last-write-wins, so a caller header with
/// the same name replaces the fixed one.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: Arc<str>,
    tokens: Arc<TokenManager>,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>, cfg: &ClientConfig) -> Self {
        Self {
            http,
            api_base: Arc::from(cfg.api_base.as_str()),
            tokens,
            request_timeout: Duration::from_secs(cfg.http.request_timeout_seconds),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        extra_headers: Option<&HeaderMap>,
    ) -> ClientResult<ApiResponse> {
        let token = self.tokens.ensure_token().await?;
        let url = build_upstream_url(&self.api_base, path);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.value())).map_err(|_| {
            ClientError::Auth("token contains characters not allowed in a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(extra) = extra_headers {
            merge_caller_headers(&mut headers, extra);
        }

        let mut req = self
            .http
            .request(method.clone(), url)
            .headers(headers)
            .timeout(self.request_timeout);
        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req
            .send()
            .await
            .map_err(|e| ClientError::transport(path, &e))?;
        let status = res.status();
        log::debug!("{method} {path} -> {}", status.as_u16());

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // The backend no longer accepts this token; the next call acquires a fresh one.
            self.tokens.invalidate_if(&token);
        }

        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                path: path.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }

        let json = is_json_content_type(res.headers());
        let text = res
            .text()
            .await
            .map_err(|e| ClientError::transport(path, &e))?;
        if !json {
            return Ok(ApiResponse::Text(text));
        }
        serde_json::from_str(&text)
            .map(ApiResponse::Json)
            .map_err(|e| ClientError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self.request(path, Method::GET, None, None).await?;
        decode_response(path, resp)
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> ClientResult<T> {
        let resp = self.request(path, Method::POST, Some(body), None).await?;
        decode_response(path, resp)
    }

    /// Unauthenticated liveness probe. Any failure reads as `Down`.
    pub async fn health(&self) -> HealthStatus {
        let url = build_upstream_url(&self.api_base, HEALTH_PATH);
        match self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => {
                HealthStatus::Up(res.text().await.unwrap_or_default())
            }
            Ok(res) => {
                log::debug!("health probe returned {}", res.status().as_u16());
                HealthStatus::Down
            }
            Err(e) => {
                log::debug!(
                    "health probe failed: {}",
                    super::diagnostics::format_reqwest_error_for_logs(&e)
                );
                HealthStatus::Down
            }
        }
    }
}
