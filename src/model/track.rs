use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{MoqtError, Result};

/// Namespace plus name, identifying a track. The namespace has between 1 and 32 fields, the name
///  is non-empty, and the combined length of all fields and the name is at most 4096 bytes.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FullTrackName {
    namespace: Vec<Bytes>,
    name: Bytes,
}

impl FullTrackName {
    pub const MIN_NAMESPACE_FIELDS: usize = 1;
    pub const MAX_NAMESPACE_FIELDS: usize = 32;
    pub const MAX_LEN: usize = 4096;

    pub fn new(namespace: Vec<Bytes>, name: impl Into<Bytes>) -> Result<FullTrackName> {
        let name = name.into();
        if namespace.len() < Self::MIN_NAMESPACE_FIELDS || namespace.len() > Self::MAX_NAMESPACE_FIELDS {
            return Err(MoqtError::protocol_violation(format!(
                "track namespace has {} fields, must be between {} and {}",
                namespace.len(), Self::MIN_NAMESPACE_FIELDS, Self::MAX_NAMESPACE_FIELDS)));
        }
        if name.is_empty() {
            return Err(MoqtError::protocol_violation("track name must not be empty"));
        }

        let result = FullTrackName { namespace, name };
        if result.total_len() > Self::MAX_LEN {
            return Err(MoqtError::protocol_violation(format!(
                "full track name is {} bytes long, maximum is {}", result.total_len(), Self::MAX_LEN)));
        }
        Ok(result)
    }

    pub fn namespace(&self) -> &[Bytes] {
        &self.namespace
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    /// combined length of all namespace fields and the name
    pub fn total_len(&self) -> usize {
        self.name.len() + self.namespace.iter().map(|f| f.len()).sum::<usize>()
    }
}

impl FromStr for FullTrackName {
    type Err = MoqtError;

    /// Parses `field/field/.../name`
    fn from_str(s: &str) -> Result<FullTrackName> {
        let mut parts = s.split('/')
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect::<Vec<_>>();

        // there is always at least one part
        let name = parts.pop().unwrap_or_default();
        FullTrackName::new(parts, name)
    }
}

impl Display for FullTrackName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for field in &self.namespace {
            write!(f, "{}/", String::from_utf8_lossy(field))?;
        }
        write!(f, "{}", String::from_utf8_lossy(&self.name))
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::single_field("live/video", 1)]
    #[case::nested("example.com/meeting/123/audio", 3)]
    #[case::empty_field("a//b", 2)]
    fn test_parse(#[case] s: &str, #[case] num_fields: usize) {
        let ftn = FullTrackName::from_str(s).unwrap();
        assert_eq!(ftn.namespace().len(), num_fields);
        assert_eq!(ftn.to_string(), s);
    }

    #[rstest]
    #[case::no_namespace("video".to_string())]
    #[case::empty(String::new())]
    #[case::empty_name("live/".to_string())]
    #[case::too_many_fields("a/".repeat(33))]
    #[case::too_long(format!("ns/{}", "x".repeat(4095)))]
    fn test_parse_invalid(#[case] s: String) {
        let err = FullTrackName::from_str(&s).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_max_fields() {
        let s = format!("{}name", "a/".repeat(32));
        let ftn = FullTrackName::from_str(&s).unwrap();
        assert_eq!(ftn.namespace().len(), 32);
    }

    #[test]
    fn test_max_len() {
        let s = format!("ns/{}", "x".repeat(4094));
        assert_eq!(FullTrackName::from_str(&s).unwrap().total_len(), 4096);
    }
}
