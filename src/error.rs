//! Error taxonomy shared by the workbench controllers, the HTTP gateway and
//! the batch runner.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, WorkbenchError>;

#[derive(Error, Debug)]
pub enum WorkbenchError {
    /// Row-limit text that is not an integer at all.
    #[error("row limit must be a whole number, got {0:?}")]
    InvalidRowLimit(String),

    /// Connection refused, DNS failure, TLS, body read errors …
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The fixed transport timeout elapsed.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Non-2xx answer from the cohort service.
    #[error("backend returned HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Backend { status: u16, message: Option<String> },

    /// A 2xx body that does not match the execute/verify contract.
    #[error("unexpected response from cohort service: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkbenchError {
    /// Message suitable for the inline verification / run indicator.
    ///
    /// `None` means the failure carried nothing worth showing and the caller
    /// should fall back to its generic text.
    pub fn reason(&self) -> Option<String> {
        match self {
            WorkbenchError::Backend { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned),
            other => Some(other.to_string()),
        }
    }
}
