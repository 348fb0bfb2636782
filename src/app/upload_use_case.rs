use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::app::ports::ArtifactStorePort;
use crate::artifact::{ArtifactManifest, PublishRequest};
use crate::error::{Result, StepError};
use crate::table::Table;

/// Publishes an existing CSV file as a new version, e.g. the raw input a
/// cleaning run will later fetch.
pub struct UploadUseCase {
    store: Arc<dyn ArtifactStorePort>,
}

impl UploadUseCase {
    pub fn new(store: Arc<dyn ArtifactStorePort>) -> Self {
        Self { store }
    }

    /// The payload is stored byte-for-byte; it is parsed only to reject
    /// non-tabular files and to fill in row count and columns.
    pub fn upload_bytes(
        &self,
        name: &str,
        type_tag: &str,
        description: &str,
        payload: Vec<u8>,
    ) -> Result<ArtifactManifest> {
        if type_tag.trim().is_empty() {
            return Err(StepError::Configuration("artifact type must not be empty".to_string()));
        }
        let table = Table::from_csv_bytes(&payload)?;
        let manifest = self.store.publish(PublishRequest {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            description: description.to_string(),
            payload,
            row_count: table.len(),
            columns: table.columns().to_vec(),
            run_id: None,
        })?;
        info!(reference = %manifest.reference, rows = manifest.row_count, "uploaded artifact");
        Ok(manifest)
    }

    pub fn upload_file(&self, path: &Path, name: &str, type_tag: &str, description: &str) -> Result<ArtifactManifest> {
        let payload = fs::read(path).map_err(|e| {
            StepError::Configuration(format!("cannot read '{}': {}", path.display(), e))
        })?;
        self.upload_bytes(name, type_tag, description, payload)
    }
}
