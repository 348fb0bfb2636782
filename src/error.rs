use thiserror::Error;

use crate::artifact::ArtifactReference;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Artifact not found: {reference}")]
    ArtifactNotFound { reference: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Published {output} but failed to record provenance: {source}")]
    ProvenanceWrite {
        output: ArtifactReference,
        #[source]
        source: Box<StepError>,
    },
}

impl StepError {
    pub fn not_found(reference: impl ToString) -> Self {
        StepError::ArtifactNotFound { reference: reference.to_string() }
    }

    /// Whether re-invoking the whole step could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Store(_))
    }

    /// Short stable label used for metrics and exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Configuration(_) => "configuration",
            StepError::ArtifactNotFound { .. } => "artifact_not_found",
            StepError::Schema(_) => "schema",
            StepError::Store(_) => "store",
            StepError::ProvenanceWrite { .. } => "provenance_write",
        }
    }

    /// Process exit status for the binary. A published artifact without
    /// lineage needs an operator, so it gets its own code.
    pub fn exit_code(&self) -> u8 {
        match self {
            StepError::ProvenanceWrite { .. } => 3,
            StepError::Configuration(_) => 2,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        StepError::Store(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::Store(format!("JSON (de)serialization failed: {}", err))
    }
}

impl From<csv::Error> for StepError {
    fn from(err: csv::Error) -> Self {
        StepError::Schema(format!("CSV payload invalid: {}", err))
    }
}

impl From<toml::de::Error> for StepError {
    fn from(err: toml::de::Error) -> Self {
        StepError::Configuration(format!("TOML deserialization failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StepError>;
