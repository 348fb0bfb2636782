// Filesystem primitives for the artifact store: content-addressed blobs and append-only logs

pub mod cas_fs;
pub mod provenance_log;
pub mod version_log;
