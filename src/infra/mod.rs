pub mod fs_artifact_store;
pub mod in_memory;
