//! Semantic version comparison
//!
//! Only strict `MAJOR.MINOR.PATCH` strings are accepted, with an optional
//! leading `v` as release tags carry it. Pre-release and build suffixes are
//! rejected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// The string is not `M.m.p`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{0}': expected MAJOR.MINOR.PATCH")]
pub struct VersionError(pub String);

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError(s.to_string());
        let body = s.strip_prefix('v').unwrap_or(s);

        let mut parts = body.split('.');
        let mut next = || -> Result<u64, VersionError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        let version = Version {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare two version strings
///
/// # Errors
/// Returns `VersionError` naming the first string that is not `M.m.p`
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a: Version = a.parse()?;
    let b: Version = b.parse()?;
    Ok(a.cmp(&b))
}

/// Whether `candidate` is strictly newer than `current`
pub fn is_newer(current: &str, candidate: &str) -> Result<bool, VersionError> {
    Ok(compare_versions(candidate, current)? == Ordering::Greater)
}
