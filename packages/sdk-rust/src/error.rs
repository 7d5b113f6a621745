use thiserror::Error;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// `json` is set when `message` came from the `error` field of a JSON
    /// body rather than from raw response text
    #[error("API error ({status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        json: bool,
    },

    #[error("Authentication rejected: {message}")]
    Unauthorized { message: String, json: bool },

    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SdkError {
    /// HTTP status of the response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::ApiError { status, .. } => Some(*status),
            SdkError::Unauthorized { .. } => Some(401),
            SdkError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Message supplied by the server, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            SdkError::ApiError { message, .. } | SdkError::Unauthorized { message, .. } => {
                let message = message.trim();
                (!message.is_empty()).then_some(message)
            }
            _ => None,
        }
    }

    /// Convert into a message suitable for display, falling back when the
    /// server did not say anything useful
    pub fn display_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }

    /// Server message, but only when it came from a JSON `error` field.
    /// Plain-text and HTML bodies (a proxy's error page) yield `None`.
    pub fn json_error_message(&self) -> Option<&str> {
        let json = match self {
            SdkError::ApiError { json, .. } | SdkError::Unauthorized { json, .. } => *json,
            _ => false,
        };
        json.then(|| self.server_message()).flatten()
    }
}

/// Client-side validation failures. These never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Fill in all required fields")]
    MissingFields,

    #[error("Amount must be a positive number")]
    InvalidAmount,
}
