use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use serde_json::Value;

use super::config::ClientConfig;
use super::diagnostics::{format_reqwest_error_for_logs, redact_url_for_logs};
use super::token::TokenManager;
use super::upstream::build_upstream_url;

pub const EVENTS_STREAM_PATH: &str = "/events/stream";

/// Largest pending event accepted before it is discarded.
pub const MAX_SSE_FRAME_BYTES: usize = 1024 * 1024;

/// Splits an SSE byte stream into the `data` payloads of complete events.
///
/// `scanned` marks how much of `buf` is known to hold no separator, so each chunk is
/// searched once. A frame growing past `max_frame_bytes` is dropped up to its separator.
#[derive(Debug)]
pub struct SseFrameDecoder {
    buf: Vec<u8>,
    scanned: usize,
    max_frame_bytes: usize,
    discarding: bool,
}

impl Default for SseFrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(MAX_SSE_FRAME_BYTES)
    }
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame_bytes,
            discarding: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        loop {
            // Back up one byte so a separator split across chunks is still found.
            let from = self.scanned.saturating_sub(1);
            let Some(pos) = self.buf[from..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.buf.len();
                break;
            };
            let idx = from + pos;
            let frame: Vec<u8> = self.buf.drain(..idx + 2).collect();
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let Some(data) = Self::frame_data(&String::from_utf8_lossy(&frame[..idx])) {
                out.push(data);
            }
        }

        if self.buf.len() > self.max_frame_bytes {
            if !self.discarding {
                log::warn!(
                    "dropping oversized event frame (> {} bytes)",
                    self.max_frame_bytes
                );
            }
            // Keep a trailing newline so a separator straddling the next chunk is not lost.
            let keep_newline = self.buf.last() == Some(&b'\n');
            self.buf.clear();
            if keep_newline {
                self.buf.push(b'\n');
            }
            self.scanned = self.buf.len();
            self.discarding = true;
        }
        out
    }

    fn frame_data(frame: &str) -> Option<String> {
        let mut lines: Vec<&str> = Vec::new();
        for line in frame.lines() {
            if line.starts_with(':') {
                continue;
            }
            let Some(rest) = line.strip_prefix("data:") else {
                continue;
            };
            lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Live subscription returned by `EventSubscriber::subscribe`.
///
/// `cancel` may be called any number of times, including after the stream already closed
/// on its own. Dropping the handle cancels the stream.
pub struct StreamHandle {
    closed: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl StreamHandle {
    pub fn cancel(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("event stream cancelled");
        }
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One-way event channel keyed by task id.
///
/// The token travels in the query string (`?task=..&token=..`), unlike the header auth
/// of `ApiClient`. Intermediaries may log URLs, so this channel only ever reuses the
/// cached short-lived credential. There is no reconnection: a transport error or the
/// server ending the response closes the channel for good.
#[derive(Clone)]
pub struct EventSubscriber {
    http: reqwest::Client,
    api_base: String,
    tokens: Arc<TokenManager>,
}

impl EventSubscriber {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>, cfg: &ClientConfig) -> Self {
        Self {
            http,
            api_base: cfg.api_base.clone(),
            tokens,
        }
    }

    pub fn stream_url(&self, task_id: &str, token: &str) -> String {
        format!(
            "{}?task={}&token={}",
            build_upstream_url(&self.api_base, EVENTS_STREAM_PATH),
            urlencoding::encode(task_id),
            urlencoding::encode(token)
        )
    }

    /// Returns `None` without touching the network when no live token is cached.
    pub fn subscribe<F>(&self, task_id: &str, on_message: F) -> Option<StreamHandle>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let Some(credential) = self.tokens.current() else {
            log::debug!("no cached token; not subscribing to task {task_id}");
            return None;
        };
        let url = self.stream_url(task_id, credential.value());
        let closed = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_stream(
            self.http.clone(),
            url,
            task_id.to_string(),
            closed.clone(),
            on_message,
        ));
        Some(StreamHandle { closed, task })
    }
}

async fn run_stream<F>(
    http: reqwest::Client,
    url: String,
    task_id: String,
    closed: Arc<AtomicBool>,
    mut on_message: F,
) where
    F: FnMut(Value) + Send + 'static,
{
    let res = match http
        .get(&url)
        .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            log::warn!(
                "event stream for task {task_id} failed to open: {}",
                format_reqwest_error_for_logs(&e)
            );
            closed.store(true, Ordering::SeqCst);
            return;
        }
    };

    if !res.status().is_success() {
        log::warn!(
            "event stream for task {task_id} rejected: status={} url={}",
            res.status().as_u16(),
            redact_url_for_logs(res.url())
        );
        closed.store(true, Ordering::SeqCst);
        return;
    }

    let mut decoder = SseFrameDecoder::new();
    let mut bytes_stream = res.bytes_stream();
    while let Some(item) = bytes_stream.next().await {
        match item {
            Ok(chunk) => {
                for data in decoder.feed(&chunk) {
                    match serde_json::from_str::<Value>(&data) {
                        Ok(v) => on_message(v),
                        Err(e) => {
                            log::warn!("dropping undecodable event for task {task_id}: {e}")
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "event stream for task {task_id} closed after error: {}",
                    format_reqwest_error_for_logs(&e)
                );
                break;
            }
        }
        if closed.load(Ordering::SeqCst) {
            break;
        }
    }
    log::debug!("event stream for task {task_id} closed");
    closed.store(true, Ordering::SeqCst);
}
