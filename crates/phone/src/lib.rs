//! Phone, zip, and state normalization.
//!
//! Contact deduplication keys on normalized phone numbers, so the same person
//! submitting `(555) 123-4567` and `1-555-123-4567` must produce the same
//! lookup key. Everything in this crate is deterministic and side-effect-free:
//! callers can re-derive a key at any point and get the same answer.
//!
//! # Canonical form
//!
//! Phone numbers normalize to `+1XXXXXXXXXX` (NANP). The rules:
//!
//! 1. Strip every non-digit character.
//! 2. 10 digits → prefix `+1`.
//! 3. 11 digits starting with `1` → prefix `+`.
//! 4. Any other digit count is rejected — never a partially-normalized value.
//!
//! # Examples
//!
//! ```rust
//! use phone::normalize;
//!
//! assert_eq!(normalize("(555) 123-4567").unwrap(), "+15551234567");
//! assert_eq!(normalize("1-555-123-4567").unwrap(), "+15551234567");
//! assert_eq!(normalize("+1 555 123 4567").unwrap(), "+15551234567");
//! assert!(normalize("12345").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection reasons for values that cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PhoneError {
    /// Input did not reduce to 10 digits or 11 digits with a leading `1`.
    #[error("invalid phone number: expected 10 or 11 digits, got {digits}")]
    InvalidPhone {
        /// Digit count after stripping formatting.
        digits: usize,
    },

    /// Zip code was not 5 digits (optionally `-` + 4 more).
    #[error("invalid zip code: {0:?}")]
    InvalidZip(String),

    /// State code was not exactly two ASCII letters.
    #[error("invalid state code: {0:?}")]
    InvalidState(String),
}

/// Normalize a raw phone string to canonical `+1XXXXXXXXXX` form.
///
/// Deterministic and idempotent: feeding the output back in returns the same
/// value, so the result is safe to use directly as a storage lookup key.
pub fn normalize(raw: &str) -> Result<String, PhoneError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        n => Err(PhoneError::InvalidPhone { digits: n }),
    }
}

/// Normalize a zip code to its 5-digit comparison form.
///
/// Accepts `NNNNN` and `NNNNN-NNNN`; the +4 extension is dropped because rule
/// criteria compare on the 5-digit prefix.
pub fn normalize_zip(raw: &str) -> Result<String, PhoneError> {
    let raw = raw.trim();
    let (head, tail) = match raw.split_once('-') {
        Some((h, t)) => (h, Some(t)),
        None => (raw, None),
    };

    let head_ok = head.len() == 5 && head.chars().all(|c| c.is_ascii_digit());
    let tail_ok = match tail {
        None => true,
        Some(t) => t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()),
    };

    if head_ok && tail_ok {
        Ok(head.to_string())
    } else {
        Err(PhoneError::InvalidZip(raw.to_string()))
    }
}

/// Normalize a state code to uppercase two-letter form.
pub fn normalize_state(raw: &str) -> Result<String, PhoneError> {
    let raw = raw.trim();
    if raw.len() == 2 && raw.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(raw.to_ascii_uppercase())
    } else {
        Err(PhoneError::InvalidState(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_digits_get_plus_one_prefix() {
        assert_eq!(normalize("5551234567").unwrap(), "+15551234567");
        assert_eq!(normalize("(555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize("555.123.4567").unwrap(), "+15551234567");
    }

    #[test]
    fn eleven_digits_with_leading_one_get_plus_prefix() {
        assert_eq!(normalize("15551234567").unwrap(), "+15551234567");
        assert_eq!(normalize("1-555-123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize("+1 (555) 123-4567").unwrap(), "+15551234567");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = ["5551234567", "1 (555) 123-4567", "+15551234567"];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "idempotence failed for {input:?}");
        }
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        for bad in ["", "123", "555123456", "25551234567", "123456789012"] {
            let err = normalize(bad).expect_err("should reject");
            assert!(matches!(err, PhoneError::InvalidPhone { .. }), "{bad:?}");
        }
    }

    #[test]
    fn eleven_digits_without_leading_one_rejected() {
        let err = normalize("25551234567").unwrap_err();
        assert_eq!(err, PhoneError::InvalidPhone { digits: 11 });
    }

    #[test]
    fn rejection_reports_digit_count_not_raw_input() {
        let err = normalize("abc-12").unwrap_err();
        assert_eq!(err, PhoneError::InvalidPhone { digits: 2 });
    }

    #[test]
    fn zip_five_digit_accepted() {
        assert_eq!(normalize_zip("90210").unwrap(), "90210");
        assert_eq!(normalize_zip(" 90210 ").unwrap(), "90210");
    }

    #[test]
    fn zip_plus_four_drops_extension() {
        assert_eq!(normalize_zip("90210-1234").unwrap(), "90210");
    }

    #[test]
    fn zip_malformed_rejected() {
        for bad in ["9021", "902101", "90210-12", "9021a", "90210-abcd"] {
            assert!(normalize_zip(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn state_uppercased() {
        assert_eq!(normalize_state("ca").unwrap(), "CA");
        assert_eq!(normalize_state("Tx").unwrap(), "TX");
        assert_eq!(normalize_state(" ny ").unwrap(), "NY");
    }

    #[test]
    fn state_malformed_rejected() {
        for bad in ["C", "CAL", "C1", ""] {
            assert!(normalize_state(bad).is_err(), "{bad:?}");
        }
    }
}
