use std::error::Error;

/// Strips query, fragment and userinfo. The event stream passes its token as a query parameter.
pub fn redact_url_for_logs(url: &reqwest::Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("<unknown>");
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!("{scheme}://{host}{port}{}", url.path())
}

/// One-line summary of a reqwest failure. Errors raised while reading a response body
/// (an event stream dropping mid-way) are labelled `stream`, everything else `request`.
pub fn format_reqwest_error_for_logs(e: &reqwest::Error) -> String {
    let phase = if e.is_body() || e.is_decode() {
        "stream"
    } else {
        "request"
    };
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_decode() {
        "decode"
    } else if e.is_body() {
        "body"
    } else {
        "other"
    };

    let mut out = format!("{phase} failed ({kind})");
    if let Some(url) = e.url() {
        out.push_str(&format!(" at {}", redact_url_for_logs(url)));
    }

    let causes = root_causes(e, 2);
    if !causes.is_empty() {
        out.push_str(&format!(": {}", causes.join(" <- ")));
    }
    out
}

/// Distinct messages from the `source()` chain, nearest first.
fn root_causes(e: &dyn Error, limit: usize) -> Vec<String> {
    let mut causes: Vec<String> = Vec::new();
    let mut next = e.source();
    while let Some(err) = next {
        if causes.len() >= limit {
            break;
        }
        let msg = err.to_string();
        if !msg.is_empty() && !causes.contains(&msg) {
            causes.push(msg);
        }
        next = err.source();
    }
    causes
}
