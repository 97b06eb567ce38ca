use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::routing::{post, MethodRouter};
use axum::Json;
use serde_json::json;

use super::config::ClientConfig;

/// Serves `app` on an ephemeral localhost port and returns its base URL.
pub(crate) async fn spawn_backend(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}:{}", addr.ip(), addr.port())
}

/// `POST /auth/token` handler issuing `tok-1`, `tok-2`, ... and counting calls.
pub(crate) fn token_route(calls: Arc<AtomicUsize>, expires_in: Option<u64>) -> MethodRouter {
    post(move || {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            match expires_in {
                Some(secs) => Json(json!({ "token": format!("tok-{n}"), "expires_in": secs })),
                None => Json(json!({ "token": format!("tok-{n}") })),
            }
        }
    })
}

pub(crate) fn test_config(api_base: &str) -> ClientConfig {
    let mut cfg = ClientConfig::default_config().with_api_base(api_base);
    cfg.polling.interval_ms = 1;
    cfg.http.request_timeout_seconds = 5;
    cfg
}

pub(crate) fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}
