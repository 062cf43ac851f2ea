//! Error types for cadence-ai

use thiserror::Error;

/// Result type alias using cadence-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a chat model provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and its body to an error.
    ///
    /// OpenAI-style bodies (`{"error": {"message", "type"}}`) are unpacked;
    /// anything else (an HTML proxy page, say) becomes the message. Either
    /// way the message is flattened to one line.
    pub fn from_status(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let (error_type, message) = parse_error_body(body)
            .unwrap_or_else(|| (format!("http_{}", status), body.to_string()));
        let message = single_line(&message, MAX_MESSAGE_CHARS);

        match status {
            401 | 403 => Error::Auth(message),
            429 => Error::RateLimited { retry_after },
            500..=599 => Error::api(
                if error_type.starts_with("http_") {
                    "server_error".to_string()
                } else {
                    error_type
                },
                message,
            ),
            _ => Error::api(error_type, message),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::RateLimited { .. } => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("server_error")
                    || et.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}

/// Longest error message kept from a response body
const MAX_MESSAGE_CHARS: usize = 200;

/// Collapse all whitespace runs (newlines included) to single spaces and
/// cut to `max` characters.
fn single_line(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let cut: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", cut)
    } else {
        cut
    }
}

fn parse_error_body(body: &str) -> Option<(String, String)> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = error.get("message")?.as_str()?.to_string();
    let error_type = error
        .get("type")
        .and_then(|t| t.as_str())
        .or_else(|| error.get("code").and_then(|c| c.as_str()))
        .unwrap_or("error")
        .to_string();
    Some((error_type, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unauthorized_is_auth() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        match Error::from_status(401, body, None) {
            Error::Auth(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status_rate_limited_keeps_retry_after() {
        let e = Error::from_status(429, "slow down", Some(7));
        assert!(matches!(e, Error::RateLimited { retry_after: Some(7) }));
        assert!(e.is_retryable());
    }

    #[test]
    fn test_from_status_server_error_plain_body() {
        let e = Error::from_status(503, "upstream unavailable\n", None);
        match &e {
            Error::Api {
                error_type,
                message,
            } => {
                assert_eq!(error_type, "server_error");
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("expected Api, got {:?}", other),
        }
        assert!(e.is_retryable());
    }

    #[test]
    fn test_from_status_html_body_flattened() {
        let body = "<html>\n<head><title>502 Bad Gateway</title></head>\n<body>nginx</body>\n</html>\n";
        let e = Error::from_status(502, body, None);
        let text = e.to_string();
        assert!(!text.contains('\n'));
        assert!(text.contains("<head><title>502 Bad Gateway</title></head> <body>nginx</body>"));
        assert!(e.is_retryable());
    }

    #[test]
    fn test_from_status_long_body_truncated() {
        let body = "x".repeat(1000);
        match Error::from_status(500, &body, None) {
            Error::Api { message, .. } => {
                assert_eq!(message.chars().count(), MAX_MESSAGE_CHARS + 3);
                assert!(message.ends_with("..."));
            }
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status_bad_request_not_retryable() {
        let body = r#"{"error": {"message": "Invalid schema for response_format", "type": "invalid_request_error"}}"#;
        let e = Error::from_status(400, body, None);
        assert!(matches!(e, Error::Api { .. }));
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_retryable_api_overloaded_message() {
        let e = Error::api("error", "The server is overloaded right now");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_not_retryable_non_api() {
        assert!(!Error::InvalidConfig("no base URL".into()).is_retryable());
        assert!(!Error::Auth("nope".into()).is_retryable());
        assert!(!Error::UnexpectedResponse("empty".into()).is_retryable());
    }
}
