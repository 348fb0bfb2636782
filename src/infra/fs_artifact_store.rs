use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app::ports::ArtifactStorePort;
use crate::artifact::{
    validate_name, Artifact, ArtifactManifest, ArtifactReference, PublishRequest, VersionSpec,
};
use crate::constants::{ARTIFACTS_DIR, CAS_DIR, LATEST_ALIAS, VERSIONS_FILE};
use crate::error::{Result, StepError};
use crate::gateway::{cas_fs, version_log};

/// Artifact store on the local filesystem.
///
/// Payloads live in a content-addressed blob tree; each artifact name has an
/// append-only `versions.ndjson`. A version exists once its manifest line has
/// been appended, which only happens after the blob is fully written.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn cas_dir(&self) -> PathBuf {
        self.root.join(CAS_DIR)
    }

    fn versions_path(&self, name: &str) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(name).join(VERSIONS_FILE)
    }

    fn load_versions(&self, name: &str) -> Result<Vec<ArtifactManifest>> {
        version_log::read_all(&self.versions_path(name))
            .map_err(|e| StepError::Store(format!("reading versions of '{}': {}", name, e)))
    }
}

/// Pick the manifest a reference points at from a name's version list.
pub(crate) fn select_version<'a>(
    versions: &'a [ArtifactManifest],
    reference: &ArtifactReference,
) -> Option<&'a ArtifactManifest> {
    match reference.version() {
        VersionSpec::Exact(n) => versions.iter().find(|m| m.reference.exact_version() == Some(*n)),
        VersionSpec::Alias(alias) if alias == LATEST_ALIAS => versions.last(),
        VersionSpec::Alias(_) => None,
    }
}

impl ArtifactStorePort for FsArtifactStore {
    fn resolve(&self, reference: &ArtifactReference) -> Result<ArtifactManifest> {
        let versions = self.load_versions(reference.name())?;
        select_version(&versions, reference)
            .cloned()
            .ok_or_else(|| StepError::not_found(reference))
    }

    fn fetch(&self, reference: &ArtifactReference) -> Result<Artifact> {
        let manifest = self.resolve(reference)?;
        let payload = cas_fs::read_cas(&self.cas_dir(), &manifest.payload_ref).map_err(|e| {
            StepError::Store(format!("payload of {} unreadable: {}", manifest.reference, e))
        })?;
        debug!(reference = %manifest.reference, bytes = payload.len(), "fetched artifact");
        Ok(Artifact { manifest, payload })
    }

    fn publish(&self, request: PublishRequest) -> Result<ArtifactManifest> {
        validate_name(&request.name)?;
        let existing = self.load_versions(&request.name)?;
        let next = existing
            .iter()
            .filter_map(|m| m.reference.exact_version())
            .max()
            .map_or(0, |v| v + 1);

        // Blob first; nothing is visible under the name until the manifest lands
        let payload_ref = cas_fs::write_cas(&self.cas_dir(), &request.payload)
            .map_err(|e| StepError::Store(format!("writing payload: {}", e)))?;
        let sha256 = payload_ref
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string();

        let manifest = ArtifactManifest {
            reference: ArtifactReference::exact(&request.name, next)?,
            type_tag: request.type_tag,
            description: request.description,
            payload_ref,
            sha256,
            size_bytes: request.payload.len() as u64,
            row_count: request.row_count,
            columns: request.columns,
            created_at: Utc::now(),
            run_id: request.run_id,
        };
        version_log::append(&self.versions_path(&request.name), &manifest)
            .map_err(|e| StepError::Store(format!("recording version {}: {}", manifest.reference, e)))?;

        info!(reference = %manifest.reference, bytes = manifest.size_bytes, "published artifact");
        Ok(manifest)
    }

    fn versions(&self, name: &str) -> Result<Vec<ArtifactManifest>> {
        validate_name(name)?;
        self.load_versions(name)
    }
}

/// Make sure the store root is usable before a run starts touching it.
pub fn ensure_root(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join(CAS_DIR))
        .and_then(|_| fs::create_dir_all(root.join(ARTIFACTS_DIR)))
        .map_err(|e| StepError::Store(format!("data root {} unusable: {}", root.display(), e)))
}
