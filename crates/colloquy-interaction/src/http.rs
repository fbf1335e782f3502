//! Shared HTTP error mapping for provider and tool clients.

use colloquy_core::ColloquyError;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Maps a transport failure. Client-side timeouts become
/// [`ColloquyError::Timeout`].
pub(crate) fn request_error(
    provider: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> ColloquyError {
    if err.is_timeout() {
        ColloquyError::Timeout(timeout)
    } else {
        ColloquyError::provider(provider, format!("request failed: {err}"))
    }
}

/// Maps a non-success HTTP response, preferring the message from a JSON
/// error body.
pub(crate) fn map_http_error(provider: &str, status: StatusCode, body: String) -> ColloquyError {
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| {
            b.message.or_else(|| {
                b.error.map(|e| match e {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Object(map) => map
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| serde_json::Value::Object(map).to_string()),
                    other => other.to_string(),
                })
            })
        })
        .unwrap_or(body);

    ColloquyError::provider(provider, format!("HTTP {}: {}", status.as_u16(), message))
}

/// Reads the body of a failed response and maps it.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ColloquyError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| format!("Failed to read {provider} error body"));
    map_http_error(provider, status, body)
}
