//! HTTP error model of the service clients

use hwcloud_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}{}: {message}", code_suffix(.code))]
    Status {
        method: String,
        url: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Build a status error from a non-success response body
    pub fn from_response(method: &str, url: &str, status: u16, body: &str) -> Self {
        let (code, message) = parse_error_body(body);
        ApiError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status,
            code,
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let kind = match &err {
            ApiError::Status { status: 404, .. } => ErrorKind::NotFound,
            ApiError::Status { status, code, .. } => ErrorKind::Api {
                status: *status,
                code: code.clone(),
            },
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::InvalidUrl { .. } => ErrorKind::Config,
            ApiError::Decode { .. } => ErrorKind::Other,
        };
        let message = err.to_string();
        ProviderError::with_kind(kind, message).with_cause(err)
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

/// Extract the error code and message from a HuaweiCloud error body
///
/// Services answer with `{"error_code": .., "error_msg": ..}`,
/// `{"error": {"code": .., "message": ..}}` or the Kubernetes-style
/// `{"errorCode": .., "message": ..}`.
pub fn parse_error_body(body: &str) -> (Option<String>, String) {
    let fallback = || body.trim().chars().take(512).collect::<String>();

    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, fallback());
    };
    let text = |v: Option<&serde_json::Value>| -> Option<String> {
        match v? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    if let Some(msg) = text(json.get("error_msg")) {
        return (text(json.get("error_code")), msg);
    }
    if let Some(inner) = json.get("error").filter(|e| e.is_object()) {
        let message = text(inner.get("message"))
            .or_else(|| text(inner.get("error_msg")))
            .unwrap_or_else(fallback);
        let code = text(inner.get("code")).or_else(|| text(inner.get("error_code")));
        return (code, message);
    }
    if let Some(msg) = text(json.get("message")) {
        let code = text(json.get("errorCode")).or_else(|| text(json.get("code")));
        return (code, msg);
    }
    (None, fallback())
}
