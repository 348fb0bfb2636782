/// Names and defaults shared across the step, the stores and the CLI

// Job identity recorded on every provenance record
pub const JOB_TYPE: &str = "basic_cleaning";

// Columns the transform depends on
pub const PRICE_COLUMN: &str = "price";
pub const LAST_REVIEW_COLUMN: &str = "last_review";

/// Rendered form of a `last_review` value that could not be parsed
pub const UNKNOWN_DATE: &str = "NaT";

// Artifact references
pub const LATEST_ALIAS: &str = "latest";
pub const REFERENCE_SEPARATOR: char = ':';
pub const CAS_PREFIX: &str = "cas:sha256:";

// File-backed store layout (relative to the data root)
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const CAS_DIR: &str = "cas";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const VERSIONS_FILE: &str = "versions.ndjson";
pub const PROVENANCE_DIR: &str = "provenance";
pub const PROVENANCE_FILE: &str = "provenance.ndjson";

// Logging
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "basic_cleaning.log";

// Configuration surface
pub const ENV_PREFIX: &str = "BASIC_CLEANING_";
pub const CONFIG_TABLE: &str = "cleaning";

/// The six options every run must resolve, in the order they are reported
pub const REQUIRED_OPTIONS: [&str; 6] = [
    "input_artifact",
    "output_artifact",
    "output_type",
    "output_description",
    "min_price",
    "max_price",
];
