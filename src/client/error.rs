use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("auth failed: {0}")]
    Auth(String),
    /// Non-2xx application response. `body` is the raw response text.
    #[error("{status} {reason} :: {body}")]
    Http {
        path: String,
        status: u16,
        reason: String,
        body: String,
    },
    #[error("{message}")]
    Task { task_id: String, message: String },
    #[error("Timeout")]
    Timeout { task_id: String, attempts: u32 },
    #[error("Free limit reached")]
    QuotaExceeded { limit: u32 },
    #[error("{path}: {message}")]
    Transport { path: String, message: String },
    #[error("{path}: unexpected response: {message}")]
    Decode { path: String, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller should present an upgrade path instead of a plain error.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    pub(crate) fn transport(path: &str, e: &reqwest::Error) -> Self {
        Self::Transport {
            path: path.to_string(),
            message: super::diagnostics::format_reqwest_error_for_logs(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_renders_status_reason_and_body() {
        let e = ClientError::Http {
            path: "/tasks".to_string(),
            status: 503,
            reason: "Service Unavailable".to_string(),
            body: "upstream busy".to_string(),
        };
        assert_eq!(e.to_string(), "503 Service Unavailable :: upstream busy");
        assert_eq!(e.status(), Some(503));
    }

    #[test]
    fn quota_exceeded_has_user_facing_message() {
        let e = ClientError::QuotaExceeded { limit: 3 };
        assert_eq!(e.to_string(), "Free limit reached");
        assert!(e.is_quota_exceeded());
        assert_eq!(e.status(), None);
    }
}
