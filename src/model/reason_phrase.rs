use std::fmt::{Display, Formatter};

use crate::error::{MoqtError, Result};

/// Human-readable explanation sent along with an error code. Limited to 1024 bytes of UTF-8.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct ReasonPhrase(String);

impl ReasonPhrase {
    pub const MAX_LEN: usize = 1024;

    pub fn new(reason: impl Into<String>) -> Result<ReasonPhrase> {
        let reason = reason.into();
        if reason.len() > Self::MAX_LEN {
            return Err(MoqtError::protocol_violation(format!(
                "reason phrase is {} bytes long, maximum is {}", reason.len(), Self::MAX_LEN)));
        }
        Ok(ReasonPhrase(reason))
    }

    /// cuts `reason` down to the maximum length, keeping whole characters
    pub fn truncating(reason: &str) -> ReasonPhrase {
        if reason.len() <= Self::MAX_LEN {
            return ReasonPhrase(reason.to_string());
        }

        let mut end = Self::MAX_LEN;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        ReasonPhrase(reason[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReasonPhrase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new() {
        assert_eq!(ReasonPhrase::new("bye").unwrap().as_str(), "bye");
        assert!(ReasonPhrase::new("x".repeat(1024)).is_ok());
        assert!(ReasonPhrase::new("x".repeat(1025)).is_err());
    }

    #[test]
    fn test_truncating_keeps_char_boundary() {
        // 'ä' is two bytes, so byte 1024 falls into the middle of a character
        let s = format!("a{}", "ä".repeat(600));
        let phrase = ReasonPhrase::truncating(&s);
        assert_eq!(phrase.as_str().len(), 1023);
        assert!(s.starts_with(phrase.as_str()));
    }

    #[test]
    fn test_truncating_short() {
        assert_eq!(ReasonPhrase::truncating("short").to_string(), "short");
    }
}
