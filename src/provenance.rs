use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactReference;
use crate::config::CleaningConfig;
use crate::constants::JOB_TYPE;
use crate::transform::TransformReport;

/// One lineage edge: `output` was derived from `input` under `config_snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub run_id: Uuid,
    pub job_type: String,
    pub input_reference: ArtifactReference,
    pub output_reference: ArtifactReference,
    pub config_snapshot: serde_json::Value,
    pub config_digest: String,
    pub report: TransformReport,
    pub timestamp: DateTime<Utc>,
}

impl ProvenanceRecord {
    pub fn new(
        run_id: Uuid,
        input_reference: ArtifactReference,
        output_reference: ArtifactReference,
        config: &CleaningConfig,
        report: TransformReport,
    ) -> Self {
        Self {
            run_id,
            job_type: JOB_TYPE.to_string(),
            input_reference,
            output_reference,
            config_snapshot: config.snapshot(),
            config_digest: config.digest(),
            report,
            timestamp: Utc::now(),
        }
    }

    pub fn touches(&self, reference: &ArtifactReference) -> bool {
        &self.input_reference == reference || &self.output_reference == reference
    }
}
