//! Dictionary versioning

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version string read from the dictionary settings node.
///
/// Dictionaries usually carry semver (`"3.0.1"`), but nothing enforces it, so
/// the raw string is always kept and the parsed form is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DictionaryVersion {
    raw: String,
    semver: Option<Version>,
}

impl DictionaryVersion {
    /// Parse a version string; never fails
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let semver = Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok();
        Self {
            raw: raw.to_string(),
            semver,
        }
    }

    /// The version exactly as authored
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed semantic version, if the string is semver
    pub fn semver(&self) -> Option<&Version> {
        self.semver.as_ref()
    }

    pub fn is_semver(&self) -> bool {
        self.semver.is_some()
    }
}

impl fmt::Display for DictionaryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<String> for DictionaryVersion {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DictionaryVersion> for String {
    fn from(version: DictionaryVersion) -> Self {
        version.raw
    }
}

impl PartialEq for DictionaryVersion {
    fn eq(&self, other: &Self) -> bool {
        match (&self.semver, &other.semver) {
            (Some(a), Some(b)) => a == b,
            _ => self.raw == other.raw,
        }
    }
}

impl Eq for DictionaryVersion {}
