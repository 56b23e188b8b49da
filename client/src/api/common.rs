//! Response decoding and failure classification.
//!
//! Converts raw [`HttpResponse`]s into typed values or [`ClientError`]s:
//! - 2xx bodies are decoded as JSON (an empty body reads as `null`)
//! - 400/422 become `ValidationFailure` with field details when present
//! - 403, 404 and 5xx map to their own kinds
//! - anything else, and every undecodable body, is a `ProtocolError`
//!
//! # Error body formats
//! The backend reports failures in the usual REST framework shapes:
//! `{"detail": "..."}`, `{"error": "..."}`, `{"field": ["msg", ...]}`,
//! `{"non_field_errors": ["msg"]}` or a bare `["msg", ...]` list.

use crate::api::transport::HttpResponse;
use crate::errors::{ClientError, ClientResult, FieldError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

const MAX_RAW_MESSAGE_LEN: usize = 200;

/// Decodes a JSON body, mapping parse failures to `ProtocolError`.
pub fn decode<T: DeserializeOwned>(body: &str) -> ClientResult<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body)
        .map_err(|e| ClientError::protocol(format!("unexpected response body: {}", e)))
}

/// Decodes a successful response or classifies a failed one.
pub fn into_result<T: DeserializeOwned>(response: HttpResponse) -> ClientResult<T> {
    if response.is_success() {
        decode(&response.body)
    } else {
        Err(classify(response.status, &response.body))
    }
}

/// Classifies a non-2xx response.
pub fn classify(status: u16, body: &str) -> ClientError {
    let (message, fields) = error_details(body);

    match status {
        400 | 422 => ClientError::ValidationFailure {
            message: message.unwrap_or_else(|| "Request was rejected".to_string()),
            fields,
        },
        401 => ClientError::Unauthenticated,
        403 => ClientError::permission_denied(
            message.unwrap_or_else(|| "You do not have permission to perform this action".to_string()),
        ),
        404 => ClientError::not_found(message.unwrap_or_else(|| "Resource not found".to_string())),
        500..=599 => ClientError::server(
            status,
            message.unwrap_or_else(|| "Internal server error".to_string()),
        ),
        _ => ClientError::protocol(format!(
            "unexpected status {}{}",
            status,
            message.map(|m| format!(": {}", m)).unwrap_or_default()
        )),
    }
}

/// Extracts a summary message and per-field errors from an error body.
fn error_details(body: &str) -> (Option<String>, Vec<FieldError>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            let raw = body.trim();
            if raw.is_empty() || raw.starts_with('<') {
                return (None, Vec::new());
            }
            let truncated: String = raw.chars().take(MAX_RAW_MESSAGE_LEN).collect();
            return (Some(truncated), Vec::new());
        }
    };

    match value {
        Value::String(message) => (Some(message), Vec::new()),
        Value::Array(_) => (join(messages_of(&value)), Vec::new()),
        Value::Object(map) => {
            let mut summary = Vec::new();
            let mut fields = Vec::new();

            for (key, value) in &map {
                match key.as_str() {
                    "detail" | "error" | "message" | "non_field_errors" => {
                        summary.extend(messages_of(value));
                    }
                    "code" => {}
                    field => fields.extend(messages_of(value).into_iter().map(|message| {
                        FieldError {
                            field: field.to_string(),
                            message,
                        }
                    })),
                }
            }

            if summary.is_empty() {
                summary.extend(
                    fields
                        .iter()
                        .map(|error| format!("{}: {}", error.field, error.message)),
                );
            }

            (join(summary), fields)
        }
        _ => (None, Vec::new()),
    }
}

fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(message) => vec![message.clone()],
        Value::Array(items) => items.iter().flat_map(messages_of).collect(),
        Value::Null => Vec::new(),
        Value::Object(map) => map.values().flat_map(messages_of).collect(),
        other => vec![other.to_string()],
    }
}

fn join(messages: Vec<String>) -> Option<String> {
    if messages.is_empty() {
        None
    } else {
        Some(messages.join(" "))
    }
}

/// A list endpoint payload: either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    Bare(Vec<T>),
    Page { results: Vec<T> },
}

impl<T> ListPayload<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListPayload::Page { results } => results,
            ListPayload::Bare(items) => items,
        }
    }
}
