use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::app::ports::{ArtifactStorePort, ProvenanceSinkPort};
use crate::artifact::{validate_name, Artifact, ArtifactManifest, ArtifactReference, PublishRequest};
use crate::constants::CAS_PREFIX;
use crate::error::{Result, StepError};
use crate::gateway::cas_fs::sha256_hex;
use crate::infra::fs_artifact_store::select_version;
use crate::provenance::ProvenanceRecord;

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| StepError::Store("in-memory store lock poisoned".to_string()))
}

/// In-memory artifact store for development/testing
#[derive(Default)]
pub struct InMemoryArtifactStore {
    versions: Arc<Mutex<HashMap<String, Vec<Artifact>>>>,
    fail_next_publish: AtomicBool,
    fetches: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `publish` fails with a store error and stores nothing.
    pub fn fail_next_publish(&self) {
        self.fail_next_publish.store(true, Ordering::SeqCst);
    }

    /// How many `fetch` calls reached the store.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Seed a version directly, bypassing any run.
    pub fn seed(&self, name: &str, type_tag: &str, payload: &[u8]) -> Result<ArtifactReference> {
        let manifest = self.publish(PublishRequest {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            description: String::new(),
            payload: payload.to_vec(),
            row_count: 0,
            columns: Vec::new(),
            run_id: None,
        })?;
        Ok(manifest.reference)
    }
}

impl ArtifactStorePort for InMemoryArtifactStore {
    fn resolve(&self, reference: &ArtifactReference) -> Result<ArtifactManifest> {
        let versions = lock(&self.versions)?;
        let manifests: Vec<ArtifactManifest> = versions
            .get(reference.name())
            .map(|v| v.iter().map(|a| a.manifest.clone()).collect())
            .unwrap_or_default();
        select_version(&manifests, reference)
            .cloned()
            .ok_or_else(|| StepError::not_found(reference))
    }

    fn fetch(&self, reference: &ArtifactReference) -> Result<Artifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let manifest = self.resolve(reference)?;
        let versions = lock(&self.versions)?;
        versions
            .get(manifest.reference.name())
            .and_then(|v| v.iter().find(|a| a.manifest.reference == manifest.reference))
            .cloned()
            .ok_or_else(|| StepError::not_found(reference))
    }

    fn publish(&self, request: PublishRequest) -> Result<ArtifactManifest> {
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(StepError::Store("injected publish failure".to_string()));
        }
        validate_name(&request.name)?;

        let mut versions = lock(&self.versions)?;
        let entry = versions.entry(request.name.clone()).or_default();
        let sha256 = sha256_hex(&request.payload);
        let manifest = ArtifactManifest {
            reference: ArtifactReference::exact(&request.name, entry.len() as u64)?,
            type_tag: request.type_tag,
            description: request.description,
            payload_ref: format!("{}{}", CAS_PREFIX, sha256),
            sha256,
            size_bytes: request.payload.len() as u64,
            row_count: request.row_count,
            columns: request.columns,
            created_at: Utc::now(),
            run_id: request.run_id,
        };
        entry.push(Artifact { manifest: manifest.clone(), payload: request.payload });

        debug!(reference = %manifest.reference, "stored artifact in memory");
        Ok(manifest)
    }

    fn versions(&self, name: &str) -> Result<Vec<ArtifactManifest>> {
        let versions = lock(&self.versions)?;
        Ok(versions
            .get(name)
            .map(|v| v.iter().map(|a| a.manifest.clone()).collect())
            .unwrap_or_default())
    }
}

/// In-memory provenance sink for development/testing
#[derive(Default)]
pub struct InMemoryProvenanceSink {
    records: Arc<Mutex<Vec<ProvenanceRecord>>>,
    fail_next_append: AtomicBool,
}

impl InMemoryProvenanceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `append` fails with a store error and records nothing.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ProvenanceRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ProvenanceSinkPort for InMemoryProvenanceSink {
    fn append(&self, record: &ProvenanceRecord) -> Result<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(StepError::Store("injected provenance failure".to_string()));
        }
        lock(&self.records)?.push(record.clone());
        Ok(())
    }

    fn records_for(&self, reference: &ArtifactReference) -> Result<Vec<ProvenanceRecord>> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|r| r.touches(reference))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_versions_resolve_by_alias_and_number() {
        let store = InMemoryArtifactStore::new();
        store.seed("sample.csv", "raw_data", b"a").unwrap();
        let r = store.seed("sample.csv", "raw_data", b"b").unwrap();
        assert_eq!(r.to_string(), "sample.csv:v1");

        let latest = store.fetch(&"sample.csv:latest".parse().unwrap()).unwrap();
        assert_eq!(latest.payload, b"b");
        let first = store.fetch(&"sample.csv:v0".parse().unwrap()).unwrap();
        assert_eq!(first.payload, b"a");
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn injected_publish_failure_stores_nothing() {
        let store = InMemoryArtifactStore::new();
        store.fail_next_publish();
        assert!(matches!(store.seed("x.csv", "raw", b"a"), Err(StepError::Store(_))));
        assert!(store.versions("x.csv").unwrap().is_empty());
        assert!(store.seed("x.csv", "raw", b"a").is_ok());
    }
}
