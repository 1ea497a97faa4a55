//! `major.minor.patch` versions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WireError;

/// A three-part semantic version. Ordering compares major, then minor,
/// then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SemanticVersion {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WireError::InvalidVersion(s.to_string());

        let mut parts = s.split('.');
        let mut next = || -> Result<u32, WireError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<(u32, u32, u32)> for SemanticVersion {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let v: SemanticVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, SemanticVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
        assert_eq!("0.0.0".parse::<SemanticVersion>().unwrap(), (0, 0, 0).into());
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "1", "1.2", "1.2.b", "1.2.3.4", "1..3", "a.b.c", "-1.2.3", "1.2.+3", " 1.2.3"] {
            assert!(bad.parse::<SemanticVersion>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_ordering() {
        let v = |s: &str| s.parse::<SemanticVersion>().unwrap();
        assert!(v("2.2.3") > v("1.3.4"));
        assert!(v("1.3.0") > v("1.2.9"));
        assert!(v("1.2.10") > v("1.2.9"));
        assert_eq!(v("1.2.3"), v("1.2.3"));
    }
}
