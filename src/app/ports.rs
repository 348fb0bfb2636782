use crate::artifact::{Artifact, ArtifactManifest, ArtifactReference, PublishRequest};
use crate::error::Result;
use crate::provenance::ProvenanceRecord;

/// Versioned, append-only artifact storage.
///
/// Implementations must never overwrite a published version; `publish`
/// either makes exactly one new version visible or none.
pub trait ArtifactStorePort: Send + Sync {
    /// Resolve a reference (exact version or alias) to its manifest.
    fn resolve(&self, reference: &ArtifactReference) -> Result<ArtifactManifest>;

    fn fetch(&self, reference: &ArtifactReference) -> Result<Artifact>;

    fn publish(&self, request: PublishRequest) -> Result<ArtifactManifest>;

    /// All versions of `name`, oldest first. Unknown names yield an empty list.
    fn versions(&self, name: &str) -> Result<Vec<ArtifactManifest>>;
}

/// Append-only sink for lineage edges.
pub trait ProvenanceSinkPort: Send + Sync {
    fn append(&self, record: &ProvenanceRecord) -> Result<()>;

    /// Records whose input or output is `reference` (exact versions only).
    fn records_for(&self, reference: &ArtifactReference) -> Result<Vec<ProvenanceRecord>>;
}
