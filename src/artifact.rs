//! Artifact identity and metadata.
//!
//! An artifact is addressed as `name:version_or_alias`. Published versions are
//! numbered `v0, v1, ...` per name and never change once written; aliases such
//! as `latest` are resolved by the store at fetch time.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{LATEST_ALIAS, REFERENCE_SEPARATOR};
use crate::error::{Result, StepError};

static EXACT_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v(\d+)$").expect("valid regex"));

/// Which version of a named artifact a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSpec {
    Exact(u64),
    Alias(String),
}

impl VersionSpec {
    pub fn latest() -> Self {
        VersionSpec::Alias(LATEST_ALIAS.to_string())
    }

    fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(StepError::Configuration(
                "artifact version or alias must not be empty".to_string(),
            ));
        }
        if let Some(caps) = EXACT_VERSION.captures(raw) {
            let n = caps[1].parse::<u64>().map_err(|e| {
                StepError::Configuration(format!("artifact version '{}' out of range: {}", raw, e))
            })?;
            return Ok(VersionSpec::Exact(n));
        }
        Ok(VersionSpec::Alias(raw.to_string()))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Exact(n) => write!(f, "v{}", n),
            VersionSpec::Alias(a) => f.write_str(a),
        }
    }
}

/// Immutable `(name, version_or_alias)` identifier of a dataset version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactReference {
    name: String,
    version: VersionSpec,
}

impl ArtifactReference {
    pub fn new(name: impl Into<String>, version: VersionSpec) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, version })
    }

    pub fn exact(name: impl Into<String>, version: u64) -> Result<Self> {
        Self::new(name, VersionSpec::Exact(version))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &VersionSpec {
        &self.version
    }

    /// The numeric version if this reference is pinned rather than an alias.
    pub fn exact_version(&self) -> Option<u64> {
        match self.version {
            VersionSpec::Exact(n) => Some(n),
            VersionSpec::Alias(_) => None,
        }
    }
}

/// Artifact names become directory names in the file store.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StepError::Configuration("artifact name must not be empty".to_string()));
    }
    if name.contains(['/', '\\', REFERENCE_SEPARATOR]) || name == "." || name == ".." {
        return Err(StepError::Configuration(format!(
            "artifact name '{}' must not contain '/', '\\' or ':'",
            name
        )));
    }
    Ok(())
}

impl FromStr for ArtifactReference {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.rsplit_once(REFERENCE_SEPARATOR) {
            Some((name, version)) => Self::new(name, VersionSpec::parse(version)?),
            None => Self::new(s, VersionSpec::latest()),
        }
    }
}

impl TryFrom<String> for ArtifactReference {
    type Error = StepError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactReference> for String {
    fn from(value: ArtifactReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, REFERENCE_SEPARATOR, self.version)
    }
}

/// Metadata the store keeps for each published version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub reference: ArtifactReference,
    pub type_tag: String,
    pub description: String,
    pub payload_ref: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub run_id: Option<Uuid>,
}

/// What a publish hands to the store before a version number exists.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub name: String,
    pub type_tag: String,
    pub description: String,
    pub payload: Vec<u8>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub run_id: Option<Uuid>,
}

/// A resolved, immutable artifact version with its payload bytes.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub manifest: ArtifactManifest,
    pub payload: Vec<u8>,
}

impl Artifact {
    pub fn reference(&self) -> &ArtifactReference {
        &self.manifest.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_versions_and_aliases() {
        let r: ArtifactReference = "sample.csv:v3".parse().unwrap();
        assert_eq!(r.name(), "sample.csv");
        assert_eq!(r.exact_version(), Some(3));

        let r: ArtifactReference = "sample.csv:prod".parse().unwrap();
        assert_eq!(r.version(), &VersionSpec::Alias("prod".to_string()));
        assert_eq!(r.exact_version(), None);
    }

    #[test]
    fn bare_name_means_latest() {
        let r: ArtifactReference = "sample.csv".parse().unwrap();
        assert_eq!(r.to_string(), "sample.csv:latest");
    }

    #[test]
    fn rejects_empty_names_and_versions() {
        assert!("".parse::<ArtifactReference>().is_err());
        assert!(":v1".parse::<ArtifactReference>().is_err());
        assert!("sample.csv:".parse::<ArtifactReference>().is_err());
        assert!("../x:v1".parse::<ArtifactReference>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let r = ArtifactReference::exact("clean_sample.csv", 0).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"clean_sample.csv:v0\"");
        let back: ArtifactReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
