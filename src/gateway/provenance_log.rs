use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::ProvenanceSinkPort;
use crate::artifact::ArtifactReference;
use crate::constants::{PROVENANCE_DIR, PROVENANCE_FILE};
use crate::error::{Result, StepError};
use crate::provenance::ProvenanceRecord;

/// Provenance sink backed by an append-only NDJSON file.
pub struct NdjsonProvenanceLog {
    path: PathBuf,
}

impl NdjsonProvenanceLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<data_root>/provenance/provenance.ndjson`
    pub fn at_root(data_root: &Path) -> Self {
        Self::new(data_root.join(PROVENANCE_DIR).join(PROVENANCE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &ProvenanceRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

impl ProvenanceSinkPort for NdjsonProvenanceLog {
    fn append(&self, record: &ProvenanceRecord) -> Result<()> {
        self.write_line(record)
            .map_err(|e| StepError::Store(format!("provenance log {}: {}", self.path.display(), e)))?;
        debug!(run_id = %record.run_id, path = %self.path.display(), "provenance appended");
        Ok(())
    }

    fn records_for(&self, reference: &ArtifactReference) -> Result<Vec<ProvenanceRecord>> {
        // Linear scan of the log (sufficient for a single step's history)
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ProvenanceRecord = serde_json::from_str(&line)?;
            if record.touches(reference) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleaningConfig;
    use crate::transform::TransformReport;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record(input: &str, output: &str) -> ProvenanceRecord {
        let config = CleaningConfig::new(0.0, 100.0, "clean_sample.csv", "clean_sample", "").unwrap();
        ProvenanceRecord::new(
            Uuid::new_v4(),
            input.parse().unwrap(),
            output.parse().unwrap(),
            &config,
            TransformReport::default(),
        )
    }

    #[test]
    fn appends_and_queries_by_reference() {
        let dir = tempdir().unwrap();
        let log = NdjsonProvenanceLog::at_root(dir.path());
        log.append(&record("sample.csv:v0", "clean_sample.csv:v0")).unwrap();
        log.append(&record("sample.csv:v1", "clean_sample.csv:v1")).unwrap();

        let hits = log.records_for(&"sample.csv:v1".parse().unwrap()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].output_reference.to_string(), "clean_sample.csv:v1");

        let hits = log.records_for(&"clean_sample.csv:v0".parse().unwrap()).unwrap();
        assert_eq!(hits.len(), 1);

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn names_needing_json_escapes_are_still_found() {
        let dir = tempdir().unwrap();
        let log = NdjsonProvenanceLog::at_root(dir.path());
        log.append(&record("sample\"q.csv:v0", "clean\"q.csv:v0")).unwrap();
        log.append(&record("sample.csv:v0", "clean_sample.csv:v0")).unwrap();

        let hits = log.records_for(&"clean\"q.csv:v0".parse().unwrap()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].input_reference.to_string(), "sample\"q.csv:v0");
        assert_eq!(log.records_for(&"sample\"q.csv:v0".parse().unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn missing_log_has_no_records() {
        let dir = tempdir().unwrap();
        let log = NdjsonProvenanceLog::at_root(dir.path());
        assert!(log.records_for(&"sample.csv:v0".parse().unwrap()).unwrap().is_empty());
    }
}
