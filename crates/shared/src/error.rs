//! Error types shared across crates
//!
//! Each enum corresponds to one error kind: validation (user input), resolution
//! (unknown zip), authentication (webhook signatures), persistence (store) and
//! collaborator (outbound SMS).

use thiserror::Error;

/// Malformed user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid phone number. Please use a 10-digit US number.")]
    InvalidPhone,

    #[error("Invalid zip code. Please use a 5-digit US zip code.")]
    InvalidZip,

    #[error("Could not find a zip code. Reply with your 5-digit zip code.")]
    ZipNotFound,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Zip code absent from the dataset, or the dataset itself is unusable
#[derive(Debug, Error)]
pub enum ZipLookupError {
    #[error("Unknown zip code: {0}")]
    UnknownZip(String),

    #[error("Failed to read zip dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid zip dataset: {0}")]
    InvalidDataset(String),
}

/// Webhook signature verification failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Signature header is malformed")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance ({age_seconds}s)")]
    TimestampExpired { age_seconds: u64 },

    #[error("Signature mismatch")]
    Mismatch,

    #[error("Invalid signing secret")]
    InvalidSecret,
}

/// Persistence failure in the subscription store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt subscription row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outbound SMS failure
#[derive(Debug, Error)]
pub enum SmsError {
    /// Twilio answered with a non-2xx status
    #[error("Twilio API error ({status}): {message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Twilio request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SmsError {
    /// HTTP status returned by the provider, if the request got that far
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SmsError::Provider { status, .. } => Some(*status),
            SmsError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    /// Provider-specific error code (e.g. Twilio's `21211`)
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            SmsError::Provider { code, .. } => code.as_deref(),
            SmsError::Transport(_) => None,
        }
    }
}

/// Missing or unparseable environment configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}
