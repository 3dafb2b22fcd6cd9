//! Shared HTTP plumbing for search backends, the page fetcher, and the LLM
//! client.

use quarry_core::CapabilityError;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Build a client with the given user agent and request timeout.
pub fn client(user_agent: &str, timeout: Duration) -> Result<Client, CapabilityError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| CapabilityError::Transport {
            name: "http".to_string(),
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Map a non-success HTTP status to the matching capability error.
pub fn check_status(name: &str, status: StatusCode) -> Result<(), CapabilityError> {
    match status.as_u16() {
        _ if status.is_success() => Ok(()),
        401 | 403 => Err(CapabilityError::Auth {
            name: name.to_string(),
            status: status.as_u16(),
        }),
        code => Err(CapabilityError::Status {
            name: name.to_string(),
            status: code,
        }),
    }
}

pub fn transport(name: &str, e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        debug!(backend = name, "Request timed out at the HTTP layer");
    }
    CapabilityError::Transport {
        name: name.to_string(),
        message: e.to_string(),
    }
}

/// Check the status and decode the body as JSON.
pub async fn json_body(name: &str, response: Response) -> Result<Value, CapabilityError> {
    check_status(name, response.status())?;
    let body = response.text().await.map_err(|e| transport(name, e))?;
    serde_json::from_str(&body).map_err(|e| CapabilityError::Parse {
        name: name.to_string(),
        message: format!("Invalid JSON: {}", e),
    })
}

/// String field of a JSON object, or `""`.
pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
