//! Error types produced by the ingest crate.
//!
//! Validation failures are the only errors the lead submitter ever sees
//! (forwarding failures are a side effect of already-successful ingestion and
//! surface through the audit log instead), so every variant here maps to a
//! concrete HTTP status via [`IngestError::http_status_code`].

use thiserror::Error;

/// Errors that can occur during lead validation and normalization.
///
/// The enum is marked `#[non_exhaustive]` to allow future additions without
/// breaking existing code; callers should include a catch-all arm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// A required field was absent or empty after sanitization.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Phone was present but could not be normalized, and the configured
    /// policy is [`InvalidPhonePolicy::Reject`](crate::InvalidPhonePolicy::Reject).
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] phone::PhoneError),

    /// Zip code present but malformed (not 5 or 5+4 digits).
    #[error("invalid zip code: {0:?}")]
    InvalidZip(String),

    /// State code present but not two ASCII letters.
    #[error("invalid state code: {0:?}")]
    InvalidState(String),

    /// Submission body exceeds the configured size limit.
    #[error("payload exceeds size limit: {size} > {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Scope identifier was empty after sanitization.
    #[error("invalid scope identifier")]
    InvalidScope,
}

impl IngestError {
    /// Suggested HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            IngestError::PayloadTooLarge { .. } => 413,
            _ => 400,
        }
    }

    /// Stable machine-readable code for API error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            IngestError::MissingField(_) => "MISSING_FIELD",
            IngestError::InvalidPhone(_) => "INVALID_PHONE",
            IngestError::InvalidZip(_) => "INVALID_ZIP",
            IngestError::InvalidState(_) => "INVALID_STATE",
            IngestError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            IngestError::InvalidScope => "INVALID_SCOPE",
        }
    }
}
