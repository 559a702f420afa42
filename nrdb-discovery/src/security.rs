//! Credentials and NRQL identifier hygiene.
//!
//! Event type and attribute names come back from the remote store and are
//! spliced into new statements, so every one of them passes through
//! [`NrqlSecurity`] first. The API key lives in a [`SecureString`] whose
//! memory is wiped on drop and whose `Debug`/`Display` output is redacted.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{DiscoveryError, Result};

/// Longest event type or attribute name NRDB accepts.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// A secret that is zeroized on drop and never printed.
#[derive(Clone)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// The raw secret. Only the transport should call this.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Last four characters, for telling keys apart in diagnostics.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(<redacted>)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Identifier quoting and literal escaping for generated NRQL.
pub struct NrqlSecurity;

impl NrqlSecurity {
    /// Validates `identifier` and wraps it in backticks.
    ///
    /// Quoting lets names with dots, dashes and keywords through unchanged.
    ///
    /// ```rust
    /// use nrdb_discovery::security::NrqlSecurity;
    ///
    /// assert_eq!(NrqlSecurity::quote_identifier("Transaction").unwrap(), "`Transaction`");
    /// assert_eq!(NrqlSecurity::quote_identifier("http.method").unwrap(), "`http.method`");
    /// assert!(NrqlSecurity::quote_identifier("bad`name").is_err());
    /// ```
    pub fn quote_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("`{identifier}`"))
    }

    pub fn validate_identifier(identifier: &str) -> Result<()> {
        let reject = |reason: &str| {
            Err(DiscoveryError::Security(format!(
                "rejected NRQL identifier {:?}: {reason}",
                crate::logging::truncate_field(identifier, 64)
            )))
        };

        if identifier.trim().is_empty() {
            return reject("blank");
        }
        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return reject("longer than 255 bytes");
        }
        // NRQL has no escape for a backtick inside a quoted name.
        if identifier.contains('`') {
            return reject("contains a backtick");
        }
        if identifier.chars().any(char::is_control) {
            return reject("contains control characters");
        }
        Ok(())
    }

    /// Escapes `value` for a single-quoted NRQL string. Control characters
    /// other than newlines are dropped.
    pub fn escape_literal(value: &str) -> String {
        value
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\r'))
            .fold(String::with_capacity(value.len()), |mut out, c| {
                match c {
                    '\\' => out.push_str(r"\\"),
                    '\'' => out.push_str(r"\'"),
                    '\n' => out.push_str(r"\n"),
                    '\r' => out.push_str(r"\r"),
                    c => out.push(c),
                }
                out
            })
    }

    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", Self::escape_literal(value))
    }
}

/// Range checks shared by the config structs.
pub struct InputValidator;

impl InputValidator {
    pub fn validate_threshold(value: f64, name: &str) -> Result<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(DiscoveryError::configuration(format!("{name} must be a finite number, got {value}")))
        }
    }

    /// Finite and within `[0, 1]`.
    pub fn validate_ratio(value: f64, name: &str) -> Result<()> {
        Self::validate_threshold(value, name)?;
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(DiscoveryError::configuration(format!("{name} must lie in [0, 1], got {value}")))
        }
    }

    pub fn validate_positive(value: u64, name: &str) -> Result<()> {
        if value == 0 {
            return Err(DiscoveryError::configuration(format!("{name} must be at least 1")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let key = SecureString::new("NRAK-ABCDEFGH1234");
        assert_eq!(format!("{key:?}"), "SecureString(<redacted>)");
        assert_eq!(key.to_string(), "<redacted>");
        assert_eq!(key.hint(), "****1234");
        assert_eq!(key.expose(), "NRAK-ABCDEFGH1234");
        assert_eq!(SecureString::new("short").hint(), "****");
        assert!(SecureString::new("  ").is_empty());
    }

    #[test]
    fn test_identifiers() {
        for ok in ["Transaction", "request.headers.host", "aws-lambda.duration", "timestamp"] {
            assert!(NrqlSecurity::validate_identifier(ok).is_ok(), "{ok}");
        }
        for bad in ["", "   ", "a`b", "line\nbreak"] {
            assert!(NrqlSecurity::validate_identifier(bad).is_err(), "{bad:?}");
        }
        let err = NrqlSecurity::validate_identifier(&"x".repeat(300)).unwrap_err();
        assert!(matches!(err, DiscoveryError::Security(_)));
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(NrqlSecurity::quote_literal("plain"), "'plain'");
        assert_eq!(NrqlSecurity::quote_literal("it's"), r"'it\'s'");
        assert_eq!(NrqlSecurity::escape_literal(r"a\b"), r"a\\b");
        assert_eq!(NrqlSecurity::escape_literal("bell\u{0007}"), "bell");
        assert_eq!(NrqlSecurity::escape_literal("two\nlines"), r"two\nlines");
    }

    #[test]
    fn test_input_validation() {
        assert!(InputValidator::validate_ratio(0.5, "ratio").is_ok());
        assert!(InputValidator::validate_ratio(1.5, "ratio").is_err());
        assert!(InputValidator::validate_ratio(f64::NAN, "ratio").is_err());
        assert!(InputValidator::validate_threshold(f64::INFINITY, "t").is_err());
        assert!(InputValidator::validate_positive(0, "burst").is_err());
        assert!(InputValidator::validate_positive(3, "burst").is_ok());
    }
}
