//! Schema version identifiers

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version id of a schema. Carried out-of-band next to encoded bytes so a
/// decoder can select the writer schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    /// Semantic version (e.g., "1.2.3")
    pub version: Version,
}

impl SchemaVersion {
    /// Create a new schema version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            version: Version::new(major, minor, patch),
        }
    }

    /// Parse a version string.
    ///
    /// Accepts full semver (`"1.2.3"`), a leading `v` (`"v1.2.3"`), and the
    /// short tags `"v1"` / `"1.2"`, where missing components are zero.
    pub fn parse(version_str: &str) -> Result<Self, semver::Error> {
        let version_str = version_str.trim();
        let version_str = version_str
            .strip_prefix('v')
            .or_else(|| version_str.strip_prefix('V'))
            .unwrap_or(version_str);

        let core_len = version_str
            .find(['-', '+'])
            .unwrap_or(version_str.len());
        let (core, suffix) = version_str.split_at(core_len);

        let padded = match core.matches('.').count() {
            0 => format!("{core}.0.0{suffix}"),
            1 => format!("{core}.0{suffix}"),
            _ => version_str.to_string(),
        };

        Ok(Self {
            version: Version::parse(&padded)?,
        })
    }

    /// Get the version string (e.g., "1.2.3")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Get the tag string (e.g., "v1.2.3")
    pub fn tag_string(&self) -> String {
        format!("v{}", self.version)
    }

    /// Whether `self` is a major version bump from `other`
    pub fn is_major_bump_from(&self, other: &SchemaVersion) -> bool {
        self.version.major > other.version.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

impl FromStr for SchemaVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = semver::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.tag_string()
    }
}
