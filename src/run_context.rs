//! One execution of the step.
//!
//! A `RunContext` is created at step start and dropped at step end. All reads
//! and writes against the artifact store and the provenance sink go through
//! it, and it refuses to record provenance for anything it did not itself
//! fetch and publish.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::ports::{ArtifactStorePort, ProvenanceSinkPort};
use crate::artifact::{ArtifactReference, PublishRequest};
use crate::config::CleaningConfig;
use crate::error::{Result, StepError};
use crate::observability::metrics;
use crate::provenance::ProvenanceRecord;
use crate::table::Table;
use crate::transform::TransformReport;

pub struct RunContext {
    run_id: Uuid,
    store: Arc<dyn ArtifactStorePort>,
    provenance: Arc<dyn ProvenanceSinkPort>,
    fetched: Vec<ArtifactReference>,
    published: Vec<ArtifactReference>,
    recorded: bool,
}

impl RunContext {
    pub fn new(store: Arc<dyn ArtifactStorePort>, provenance: Arc<dyn ProvenanceSinkPort>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            store,
            provenance,
            fetched: Vec::new(),
            published: Vec::new(),
            recorded: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Resolve `reference` and materialize its payload as a table.
    ///
    /// Returns the exact (`name:vN`) reference that was read alongside the
    /// table, so aliases are pinned in provenance.
    pub fn fetch(&mut self, reference: &ArtifactReference) -> Result<(ArtifactReference, Table)> {
        let artifact = self.store.fetch(reference).inspect_err(|e| metrics::store::fetch_error(e.kind()))?;
        let resolved = artifact.manifest.reference.clone();
        metrics::store::fetch_success(artifact.payload.len());

        let table = Table::from_csv_bytes(&artifact.payload).map_err(|e| {
            metrics::store::fetch_error("schema");
            StepError::Schema(format!("{} is not tabular: {}", resolved, e))
        })?;

        info!(requested = %reference, resolved = %resolved, rows = table.len(), "fetched input artifact");
        self.fetched.push(resolved.clone());
        Ok((resolved, table))
    }

    /// Serialize `table` and store it as a new version of `name`.
    pub fn publish(
        &mut self,
        table: &Table,
        name: &str,
        type_tag: &str,
        description: &str,
    ) -> Result<ArtifactReference> {
        let payload = table.to_csv_bytes()?;
        let size = payload.len();
        let request = PublishRequest {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            description: description.to_string(),
            payload,
            row_count: table.len(),
            columns: table.columns().to_vec(),
            run_id: Some(self.run_id),
        };
        let manifest = self
            .store
            .publish(request)
            .inspect_err(|e| metrics::store::publish_error(e.kind()))?;
        metrics::store::publish_success(size);

        info!(reference = %manifest.reference, rows = table.len(), "published output artifact");
        self.published.push(manifest.reference.clone());
        Ok(manifest.reference)
    }

    /// Append the lineage edge for this run. Allowed once, and only for
    /// references this context actually fetched and published.
    pub fn record_provenance(
        &mut self,
        input: &ArtifactReference,
        output: &ArtifactReference,
        config: &CleaningConfig,
        report: TransformReport,
    ) -> Result<ProvenanceRecord> {
        if self.recorded {
            return Err(StepError::Configuration(format!(
                "provenance already recorded for run {}",
                self.run_id
            )));
        }
        if !self.fetched.contains(input) {
            return Err(StepError::Configuration(format!("{} was not fetched by run {}", input, self.run_id)));
        }
        if !self.published.contains(output) {
            return Err(StepError::Configuration(format!(
                "{} was not published by run {}",
                output, self.run_id
            )));
        }

        let record = ProvenanceRecord::new(self.run_id, input.clone(), output.clone(), config, report);
        match self.provenance.append(&record) {
            Ok(()) => metrics::provenance::write_success(),
            Err(e) => {
                metrics::provenance::write_error();
                return Err(StepError::ProvenanceWrite { output: output.clone(), source: Box::new(e) });
            }
        }
        self.recorded = true;
        debug!(run_id = %self.run_id, input = %input, output = %output, "provenance recorded");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory::{InMemoryArtifactStore, InMemoryProvenanceSink};

    fn context() -> (Arc<InMemoryArtifactStore>, Arc<InMemoryProvenanceSink>, RunContext) {
        let store = Arc::new(InMemoryArtifactStore::new());
        let sink = Arc::new(InMemoryProvenanceSink::new());
        let ctx = RunContext::new(store.clone(), sink.clone());
        (store, sink, ctx)
    }

    fn config() -> CleaningConfig {
        CleaningConfig::new(0.0, 100.0, "clean_sample.csv", "clean_sample", "cleaned").unwrap()
    }

    #[test]
    fn fetch_pins_aliases_to_exact_versions() {
        let (store, _, mut ctx) = context();
        store.seed("sample.csv", "raw_data", b"price,last_review\n1,2019-01-01\n").unwrap();
        let (resolved, table) = ctx.fetch(&"sample.csv".parse().unwrap()).unwrap();
        assert_eq!(resolved.to_string(), "sample.csv:v0");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn non_tabular_payload_is_a_schema_error() {
        let (store, _, mut ctx) = context();
        store.seed("blob", "raw_data", b"a,b\n1\n").unwrap();
        let err = ctx.fetch(&"blob".parse().unwrap()).unwrap_err();
        assert!(matches!(err, StepError::Schema(_)));
    }

    #[test]
    fn provenance_is_recorded_once_for_real_references() {
        let (store, sink, mut ctx) = context();
        store.seed("sample.csv", "raw_data", b"price,last_review\n1,2019-01-01\n").unwrap();
        let (input, table) = ctx.fetch(&"sample.csv".parse().unwrap()).unwrap();

        let stray: ArtifactReference = "other.csv:v0".parse().unwrap();
        assert!(ctx.record_provenance(&input, &stray, &config(), TransformReport::default()).is_err());

        let output = ctx.publish(&table, "clean_sample.csv", "clean_sample", "cleaned").unwrap();
        let record = ctx.record_provenance(&input, &output, &config(), TransformReport::default()).unwrap();
        assert_eq!(record.run_id, ctx.run_id());
        assert!(ctx.record_provenance(&input, &output, &config(), TransformReport::default()).is_err());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn sink_failure_surfaces_the_published_output() {
        let (store, sink, mut ctx) = context();
        store.seed("sample.csv", "raw_data", b"price,last_review\n1,2019-01-01\n").unwrap();
        let (input, table) = ctx.fetch(&"sample.csv".parse().unwrap()).unwrap();
        let output = ctx.publish(&table, "clean_sample.csv", "clean_sample", "cleaned").unwrap();

        sink.fail_next_append();
        match ctx.record_provenance(&input, &output, &config(), TransformReport::default()) {
            Err(StepError::ProvenanceWrite { output: o, .. }) => assert_eq!(o, output),
            other => panic!("expected ProvenanceWrite, got {:?}", other),
        }
        assert!(sink.records().is_empty());
    }
}
