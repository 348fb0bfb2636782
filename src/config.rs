use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::artifact::{validate_name, ArtifactReference};
use crate::constants::{CONFIG_TABLE, ENV_PREFIX, REQUIRED_OPTIONS};
use crate::error::{Result, StepError};

/// Validated parameters of one cleaning run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningConfig {
    min_price: f64,
    max_price: f64,
    output_artifact_name: String,
    output_type: String,
    output_description: String,
}

impl CleaningConfig {
    pub fn new(
        min_price: f64,
        max_price: f64,
        output_artifact_name: impl Into<String>,
        output_type: impl Into<String>,
        output_description: impl Into<String>,
    ) -> Result<Self> {
        let output_artifact_name = output_artifact_name.into();
        let output_type = output_type.into();

        if !min_price.is_finite() || !max_price.is_finite() {
            return Err(StepError::Configuration(format!(
                "price bounds must be finite numbers (min_price={}, max_price={})",
                min_price, max_price
            )));
        }
        if min_price > max_price {
            return Err(StepError::Configuration(format!(
                "min_price ({}) must not exceed max_price ({})",
                min_price, max_price
            )));
        }
        validate_name(&output_artifact_name)?;
        if output_type.trim().is_empty() {
            return Err(StepError::Configuration("output_type must not be empty".to_string()));
        }

        Ok(Self {
            min_price,
            max_price,
            output_artifact_name,
            output_type,
            output_description: output_description.into(),
        })
    }

    pub fn min_price(&self) -> f64 {
        self.min_price
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    pub fn output_artifact_name(&self) -> &str {
        &self.output_artifact_name
    }

    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    pub fn output_description(&self) -> &str {
        &self.output_description
    }

    /// Inclusive on both ends.
    pub fn accepts_price(&self, price: f64) -> bool {
        self.min_price <= price && price <= self.max_price
    }

    /// JSON snapshot stored on provenance records.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// SHA-256 hex of the snapshot. Struct field order is fixed, so equal
    /// configs always hash equally.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.snapshot().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Raw, possibly incomplete options gathered from file, environment and flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepOptions {
    pub input_artifact: Option<String>,
    pub output_artifact: Option<String>,
    pub output_type: Option<String>,
    pub output_description: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "cleaning")]
    cleaning: Option<StepOptions>,
}

impl StepOptions {
    /// Load the `[cleaning]` table of a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StepError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.cleaning.ok_or_else(|| {
            StepError::Configuration(format!("config file has no [{}] table", CONFIG_TABLE))
        })
    }

    /// Read `BASIC_CLEANING_<KEY>` variables through the given lookup.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, key.to_uppercase()))
                .filter(|v| !v.trim().is_empty())
        };
        Ok(Self {
            input_artifact: get("input_artifact"),
            output_artifact: get("output_artifact"),
            output_type: get("output_type"),
            output_description: get("output_description"),
            min_price: get("min_price").map(|v| parse_bound("min_price", &v)).transpose()?,
            max_price: get("max_price").map(|v| parse_bound("max_price", &v)).transpose()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Fields set in `other` win over fields set in `self`.
    pub fn merge(self, other: StepOptions) -> Self {
        Self {
            input_artifact: other.input_artifact.or(self.input_artifact),
            output_artifact: other.output_artifact.or(self.output_artifact),
            output_type: other.output_type.or(self.output_type),
            output_description: other.output_description.or(self.output_description),
            min_price: other.min_price.or(self.min_price),
            max_price: other.max_price.or(self.max_price),
        }
    }

    /// Turn the options into a validated config and the input reference.
    /// Reports every missing option at once.
    pub fn resolve(&self) -> Result<(CleaningConfig, ArtifactReference)> {
        let present = [
            self.input_artifact.is_some(),
            self.output_artifact.is_some(),
            self.output_type.is_some(),
            self.output_description.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
        ];
        let missing: Vec<&str> = REQUIRED_OPTIONS
            .iter()
            .zip(present)
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(StepError::Configuration(format!(
                "missing required option(s): {}",
                missing.join(", ")
            )));
        }

        let config = CleaningConfig::new(
            self.min_price.unwrap_or_default(),
            self.max_price.unwrap_or_default(),
            self.output_artifact.clone().unwrap_or_default(),
            self.output_type.clone().unwrap_or_default(),
            self.output_description.clone().unwrap_or_default(),
        )?;
        let input: ArtifactReference = self.input_artifact.as_deref().unwrap_or_default().parse()?;
        Ok((config, input))
    }
}

fn parse_bound(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| StepError::Configuration(format!("{} must be a number, got '{}'", key, raw)))
}
