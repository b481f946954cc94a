//! Configuration types for the ingest pipeline.
//!
//! [`IngestConfig`] controls how raw submissions are interpreted, defaulted,
//! and constrained at runtime. It is cheap to clone and deserializes from
//! JSON, TOML, or environment-sourced config.
//!
//! # Quick Start
//!
//! ```rust
//! use ingest::IngestConfig;
//!
//! let config = IngestConfig::default();
//! config.validate().expect("invalid configuration");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do with a submission whose phone is present but malformed.
///
/// The upstream contract treats malformed phones as validation errors, so
/// `Reject` is the default; `AcceptWithoutDedup` keeps the lead but gives it
/// a fresh contact with no dedup key.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPhonePolicy {
    #[default]
    Reject,
    AcceptWithoutDedup,
}

/// How to deduplicate a submission that carries no phone at all.
///
/// `Email` dedupes on the lowercased email within the scope; `Never` creates
/// a fresh contact per submission (useful for sources where many people share
/// one mailbox).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhonelessDedup {
    #[default]
    Email,
    Never,
}

/// Runtime configuration for ingest behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Strip ASCII control characters from string fields.
    #[serde(default = "default_true")]
    pub strip_control_chars: bool,

    /// Maximum serialized submission size in bytes. `None` disables the check
    /// (the HTTP layer enforces its own body limit regardless).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: Option<usize>,

    #[serde(default)]
    pub invalid_phone_policy: InvalidPhonePolicy,

    #[serde(default)]
    pub phoneless_dedup: PhonelessDedup,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            strip_control_chars: true,
            max_payload_bytes: default_max_payload_bytes(),
            invalid_phone_policy: InvalidPhonePolicy::default(),
            phoneless_dedup: PhonelessDedup::default(),
        }
    }
}

impl IngestConfig {
    pub fn with_invalid_phone_policy(mut self, policy: InvalidPhonePolicy) -> Self {
        self.invalid_phone_policy = policy;
        self
    }

    pub fn with_phoneless_dedup(mut self, dedup: PhonelessDedup) -> Self {
        self.phoneless_dedup = dedup;
        self
    }

    pub fn with_max_payload_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Validate the configuration. Call once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = self.max_payload_bytes {
            if limit == 0 {
                return Err(ConfigError::Invalid(
                    "max_payload_bytes must be greater than zero when set".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Configuration validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid ingest config: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_max_payload_bytes() -> Option<usize> {
    Some(1024 * 1024)
}
