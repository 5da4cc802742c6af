//! Dotted version strings and compatibility requirements.
//!
//! Versions are `major.minor[.patch]` with patch defaulting to 0;
//! comparison is lexicographic over the three integers. A dependency may
//! carry several requirements (exact, minimum, maximum) and all of them
//! must hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version component '{0}'")]
    InvalidComponent(String),

    #[error("version '{0}' has too many components")]
    TooManyComponents(String),
}

/// A parsed `major.minor[.patch]` version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut components = [0u32; 3];
        let mut count = 0;
        for part in s.split('.') {
            if count >= 3 {
                return Err(VersionError::TooManyComponents(s.to_string()));
            }
            components[count] = part
                .parse()
                .map_err(|_| VersionError::InvalidComponent(part.to_string()))?;
            count += 1;
        }
        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
        })
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How a required version relates to the installed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Exact,
    Min,
    Max,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementKind::Exact => write!(f, "="),
            RequirementKind::Min => write!(f, ">="),
            RequirementKind::Max => write!(f, "<="),
        }
    }
}

/// One version constraint on a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequirement {
    pub kind: RequirementKind,
    pub version: Version,
}

impl VersionRequirement {
    pub fn exact(version: Version) -> Self {
        Self {
            kind: RequirementKind::Exact,
            version,
        }
    }

    pub fn min(version: Version) -> Self {
        Self {
            kind: RequirementKind::Min,
            version,
        }
    }

    pub fn max(version: Version) -> Self {
        Self {
            kind: RequirementKind::Max,
            version,
        }
    }

    pub fn matches(&self, installed: Version) -> bool {
        match self.kind {
            RequirementKind::Exact => installed == self.version,
            RequirementKind::Min => installed >= self.version,
            RequirementKind::Max => installed <= self.version,
        }
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.version)
    }
}

/// String-level compatibility check. Unparseable versions are never
/// compatible; version faults are reported, not thrown.
pub fn is_compatible(installed: &str, required: &str, kind: RequirementKind) -> bool {
    match (Version::parse(installed), Version::parse(required)) {
        (Ok(installed), Ok(required)) => VersionRequirement { kind, version: required }.matches(installed),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_patch_to_zero() {
        assert_eq!(Version::parse("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::parse("7").unwrap(), Version::new(7, 0, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
    }

    #[test]
    fn comparison_is_lexicographic() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
        assert!(Version::new(1, 2, 0) == Version::parse("1.2").unwrap());
    }

    #[test]
    fn compatibility_checks() {
        assert!(is_compatible("1.2.0", "1.2.0", RequirementKind::Min));
        assert!(!is_compatible("1.1.9", "1.2.0", RequirementKind::Min));
        assert!(!is_compatible("2.0.0", "1.9.9", RequirementKind::Max));
        assert!(is_compatible("1.2", "1.2.0", RequirementKind::Exact));
        assert!(!is_compatible("not-a-version", "1.0", RequirementKind::Min));
    }

    #[test]
    fn combined_requirements_all_must_hold() {
        let installed = Version::parse("1.5.2").unwrap();
        let range = [
            VersionRequirement::min(Version::new(1, 2, 0)),
            VersionRequirement::max(Version::new(2, 0, 0)),
        ];
        assert!(range.iter().all(|req| req.matches(installed)));

        let too_new = Version::parse("2.1.0").unwrap();
        assert!(!range.iter().all(|req| req.matches(too_new)));
    }
}
