//! Error types for Eventhub

use thiserror::Error;

/// Result type alias using Eventhub's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Eventhub error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // API errors (E100-E199)
    #[error("Network error: {0}. Check that the Eventhub API is reachable.")]
    NetworkError(#[from] reqwest::Error),

    /// Non-2xx response. The server payload is kept as-is so callers can
    /// inspect it.
    #[error("API error ({status}){}", api_error_suffix(.body))]
    Api {
        status: u16,
        body: Option<serde_json::Value>,
    },

    // Session errors (E200-E299)
    /// A displayable failure from a session operation.
    #[error("{0}")]
    Session(String),

    #[error("Not logged in. Run `eventhub login` first.")]
    NotAuthenticated,

    // Storage errors (E300-E399)
    #[error("Storage error: {0}")]
    Storage(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn api_error_suffix(body: &Option<serde_json::Value>) -> String {
    match body.as_ref().and_then(server_error_field) {
        Some(message) => format!(": {}", message),
        None => String::new(),
    }
}

fn server_error_field(body: &serde_json::Value) -> Option<&str> {
    body.get("error").and_then(|v| v.as_str())
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkError(_) => "E100",
            Self::Api { .. } => "E101",
            Self::Session(_) => "E200",
            Self::NotAuthenticated => "E201",
            Self::Storage(_) => "E300",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NetworkError(_) => Some("eventhub config get api.base_url".to_string()),
            Self::Api { status: 401, .. } | Self::NotAuthenticated => {
                Some("eventhub login".to_string())
            }
            Self::ConfigError(_) => Some("eventhub config list".to_string()),
            _ => None,
        }
    }

    /// HTTP status of an API error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the server rejected the credential
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message suitable for showing to a user.
    ///
    /// Uses the `error` field of the server's response body when there is
    /// one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Api {
                body: Some(body), ..
            } => server_error_field(body)
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
            _ => fallback.to_string(),
        }
    }

    /// Convert into a displayable session error using [`Error::user_message`]
    pub fn into_session(self, fallback: &str) -> Self {
        Self::Session(self.user_message(fallback))
    }
}
