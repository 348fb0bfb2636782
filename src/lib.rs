pub mod artifact;
pub mod config;
pub mod constants;
pub mod error;
pub mod provenance;
pub mod run_context;
pub mod table;
pub mod transform;

// Filesystem primitives behind the artifact store
pub mod gateway;
pub mod observability;
pub mod pipeline;

// Layered boundaries: ports in app, adapters in infra
pub mod app;
pub mod infra;

pub use artifact::{Artifact, ArtifactManifest, ArtifactReference, VersionSpec};
pub use config::{CleaningConfig, StepOptions};
pub use error::{Result, StepError};
pub use pipeline::step_driver::{StepDriver, StepState};
pub use provenance::ProvenanceRecord;
pub use run_context::RunContext;
pub use table::{Table, Value};
pub use transform::TransformReport;
