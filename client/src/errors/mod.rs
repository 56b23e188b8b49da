//! Client-wide error types.
//!
//! Every backend call ends in either a decoded value or a [`ClientError`].
//! Only the token refresh path is handled internally by the
//! [`AuthenticatedClient`](crate::api::client::AuthenticatedClient); every
//! other failure is classified here and handed to the caller, which owns
//! user-visible messaging.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-specific validation error details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the field with validation error
    pub field: String,
    /// Description of the validation failure
    pub message: String,
}

/// Classified failure of a backend interaction.
///
/// `Clone` so that a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No credential is stored; the caller must route to login.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The refresh token was rejected and the stored session was cleared.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// The token endpoint rejected the username/password pair.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Validation error: {message}")]
    ValidationFailure {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed or unexpected response shape.
    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    /// Network failure or timeout. Never retried automatically.
    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    #[error("Credential storage error: {message}")]
    Storage { message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the caller must send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::SessionExpired)
    }

    /// Whether a manual retry affordance makes sense for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure { .. } | Self::Server { .. })
    }

    /// Whether the backend refused the request itself (as opposed to the
    /// request never completing).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailure { .. } | Self::PermissionDenied { .. }
        )
    }

    /// Field-level details of a validation failure, empty for other kinds.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::ValidationFailure { fields, .. } => fields,
            _ => &[],
        }
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| FieldError {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));

        let message = fields
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect::<Vec<_>>()
            .join(", ");

        Self::ValidationFailure { message, fields }
    }
}
