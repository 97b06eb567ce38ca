use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::{ClientError, ClientResult};
use super::quota::QuotaTracker;
use super::upstream::ApiClient;

pub const CHAT_PATH: &str = "/chat/compliance";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    reply: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// The thread id now in effect: the one the backend returned, else the one sent.
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

/// Metered compliance chat gated by the local daily counter.
#[derive(Clone)]
pub struct ChatSession {
    api: ApiClient,
    quota: QuotaTracker,
}

impl ChatSession {
    pub fn new(api: ApiClient, quota: QuotaTracker) -> Self {
        Self { api, quota }
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub async fn ask(&self, message: &str) -> ClientResult<ChatReply> {
        // Re-read on every call; another ask may have consumed quota while this one awaited.
        if self.quota.remaining() == 0 {
            return Err(ClientError::QuotaExceeded {
                limit: self.quota.daily_limit(),
            });
        }

        let sent_thread = self.quota.get_thread();
        let mut body = json!({ "message": message });
        if let Some(t) = &sent_thread {
            body["thread_id"] = json!(t);
        }

        let res: ChatResponse = self.api.post_json(CHAT_PATH, &body).await?;
        let returned_thread = res
            .thread_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(t) = &returned_thread {
            self.quota.set_thread(t);
        }
        let used = self.quota.consume();
        log::debug!("chat answered; {used}/{} used today", self.quota.daily_limit());

        Ok(ChatReply {
            reply: res.reply,
            thread_id: returned_thread.or(sent_thread),
            usage: res.usage,
        })
    }

    /// Forgets the conversation thread. The daily counter is untouched.
    pub fn clear(&self) {
        self.quota.clear_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::config::ChatConfig;
    use crate::client::storage::{KvStore, MemoryKvStore};
    use crate::client::test_support::{count, spawn_backend, test_config, token_route};
    use crate::client::token::{TokenManager, TOKEN_PATH};
    use crate::client::upstream::build_http_client;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::Value;

    struct Harness {
        chat: ChatSession,
        store: Arc<MemoryKvStore>,
        token_calls: Arc<AtomicUsize>,
        chat_calls: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn harness(fail: bool) -> Harness {
        let token_calls = Arc::new(AtomicUsize::new(0));
        let chat_calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let chat_calls2 = chat_calls.clone();
        let bodies2 = bodies.clone();
        let app = Router::new()
            .route(TOKEN_PATH, token_route(token_calls.clone(), Some(300)))
            .route(
                CHAT_PATH,
                post(move |Json(body): Json<Value>| {
                    let n = chat_calls2.fetch_add(1, Ordering::SeqCst) + 1;
                    bodies2.lock().push(body);
                    async move {
                        if fail {
                            return (StatusCode::INTERNAL_SERVER_ERROR, "model offline")
                                .into_response();
                        }
                        Json(serde_json::json!({
                            "reply": format!("answer {n}"),
                            "thread_id": "th-1",
                            "usage": { "free_remaining": 3 - n as i64, "tier": "free" }
                        }))
                        .into_response()
                    }
                }),
            );
        let base = spawn_backend(app).await;
        let cfg = test_config(&base);
        let http = build_http_client(&cfg.http).unwrap();
        let tokens = Arc::new(TokenManager::new(http.clone(), &cfg));
        let api = ApiClient::new(http, tokens, &cfg);
        let store = Arc::new(MemoryKvStore::new());
        let quota = QuotaTracker::new(store.clone(), &ChatConfig::default());
        Harness {
            chat: ChatSession::new(api, quota),
            store,
            token_calls,
            chat_calls,
            bodies,
        }
    }

    #[tokio::test]
    async fn three_questions_exhaust_free_limit_then_gate_locally() {
        let h = harness(false).await;

        for i in 1..=3 {
            let r = h.chat.ask("Do we need a DPA?").await.unwrap();
            assert_eq!(r.reply, format!("answer {i}"));
        }
        assert_eq!(h.chat.quota().remaining(), 0);
        assert_eq!(count(&h.chat_calls), 3);

        let err = h.chat.ask("one more").await.unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(err.to_string(), "Free limit reached");
        assert_eq!(count(&h.chat_calls), 3);
        assert_eq!(count(&h.token_calls), 1);
    }

    #[tokio::test]
    async fn exhausted_quota_never_touches_network() {
        let h = harness(false).await;
        h.store.set(
            "cgpt_free_quota_v1",
            &serde_json::json!({ "day": crate::client::quota::today_key(), "used": 3 })
                .to_string(),
        );

        for _ in 0..5 {
            let err = h.chat.ask("hello").await.unwrap_err();
            assert!(matches!(err, ClientError::QuotaExceeded { limit: 3 }));
        }
        assert_eq!(count(&h.chat_calls), 0);
        assert_eq!(count(&h.token_calls), 0);
    }

    #[tokio::test]
    async fn thread_id_is_persisted_and_sent_on_next_question() {
        let h = harness(false).await;

        let first = h.chat.ask("What is SOC 2?").await.unwrap();
        assert_eq!(first.thread_id.as_deref(), Some("th-1"));
        assert_eq!(
            first.usage,
            Some(ChatUsage {
                free_remaining: Some(2),
                tier: Some("free".to_string())
            })
        );
        assert_eq!(h.chat.quota().get_thread().as_deref(), Some("th-1"));

        h.chat.ask("And ISO 27001?").await.unwrap();

        let bodies = h.bodies.lock().clone();
        assert_eq!(bodies[0], serde_json::json!({ "message": "What is SOC 2?" }));
        assert_eq!(
            bodies[1],
            serde_json::json!({ "message": "And ISO 27001?", "thread_id": "th-1" })
        );
    }

    #[tokio::test]
    async fn failed_round_trip_is_not_charged() {
        let h = harness(true).await;

        let err = h.chat.ask("hello").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(h.chat.quota().remaining(), 3);
        assert_eq!(h.chat.quota().get_thread(), None);
    }

    #[tokio::test]
    async fn clear_drops_thread_but_keeps_count() {
        let h = harness(false).await;
        h.chat.ask("hello").await.unwrap();

        h.chat.clear();
        assert_eq!(h.chat.quota().get_thread(), None);
        assert_eq!(h.chat.quota().remaining(), 2);

        h.chat.ask("fresh start").await.unwrap();
        let bodies = h.bodies.lock().clone();
        assert_eq!(bodies[1], serde_json::json!({ "message": "fresh start" }));
    }
}
