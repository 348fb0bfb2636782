//! Metrics for the cleaning step
//!
//! Counters and histograms are recorded through the `metrics` facade. The
//! library never installs a recorder; when the host process has none the
//! calls are no-ops.

use std::fmt;

/// Enum representing all metric names used by the step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch metrics
    FetchSuccess,
    FetchError,
    FetchBytes,

    // Transform metrics
    TransformRowsRead,
    TransformRowsKept,
    TransformRowsDropped,
    TransformUnknownDates,

    // Publish metrics
    PublishSuccess,
    PublishError,
    PublishBytes,

    // Provenance metrics
    ProvenanceWritesSuccess,
    ProvenanceWritesError,

    // Run metrics
    RunsTotal,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FetchSuccess => "basic_cleaning_fetch_success_total",
            MetricName::FetchError => "basic_cleaning_fetch_error_total",
            MetricName::FetchBytes => "basic_cleaning_fetch_bytes",

            MetricName::TransformRowsRead => "basic_cleaning_rows_read_total",
            MetricName::TransformRowsKept => "basic_cleaning_rows_kept_total",
            MetricName::TransformRowsDropped => "basic_cleaning_rows_dropped_total",
            MetricName::TransformUnknownDates => "basic_cleaning_dates_sentinel_total",

            MetricName::PublishSuccess => "basic_cleaning_artifacts_published_total",
            MetricName::PublishError => "basic_cleaning_publish_error_total",
            MetricName::PublishBytes => "basic_cleaning_publish_bytes",

            MetricName::ProvenanceWritesSuccess => "basic_cleaning_provenance_writes_success_total",
            MetricName::ProvenanceWritesError => "basic_cleaning_provenance_writes_error_total",

            MetricName::RunsTotal => "basic_cleaning_runs_total",
            MetricName::RunDuration => "basic_cleaning_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Store Metrics
// ============================================================================

pub mod store {
    use super::MetricName;

    pub fn fetch_success(bytes: usize) {
        ::metrics::counter!(MetricName::FetchSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::FetchBytes.as_str()).record(bytes as f64);
    }

    pub fn fetch_error(kind: &'static str) {
        ::metrics::counter!(MetricName::FetchError.as_str(), "kind" => kind).increment(1);
    }

    pub fn publish_success(bytes: usize) {
        ::metrics::counter!(MetricName::PublishSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PublishBytes.as_str()).record(bytes as f64);
    }

    pub fn publish_error(kind: &'static str) {
        ::metrics::counter!(MetricName::PublishError.as_str(), "kind" => kind).increment(1);
    }
}

// ============================================================================
// Transform Metrics
// ============================================================================

pub mod transform {
    use super::MetricName;
    use crate::transform::TransformReport;

    /// Record the row-level outcome of one transform
    pub fn report(report: &TransformReport) {
        ::metrics::counter!(MetricName::TransformRowsRead.as_str()).increment(report.rows_in as u64);
        ::metrics::counter!(MetricName::TransformRowsKept.as_str()).increment(report.rows_kept as u64);
        ::metrics::counter!(MetricName::TransformRowsDropped.as_str(), "reason" => "missing_price")
            .increment(report.dropped_missing_price as u64);
        ::metrics::counter!(MetricName::TransformRowsDropped.as_str(), "reason" => "invalid_price")
            .increment(report.dropped_invalid_price as u64);
        ::metrics::counter!(MetricName::TransformRowsDropped.as_str(), "reason" => "out_of_range")
            .increment(report.dropped_out_of_range as u64);
        ::metrics::counter!(MetricName::TransformUnknownDates.as_str())
            .increment(report.unknown_dates as u64);
    }
}

// ============================================================================
// Provenance Metrics
// ============================================================================

pub mod provenance {
    use super::MetricName;

    pub fn write_success() {
        ::metrics::counter!(MetricName::ProvenanceWritesSuccess.as_str()).increment(1);
    }

    pub fn write_error() {
        ::metrics::counter!(MetricName::ProvenanceWritesError.as_str()).increment(1);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    /// Record a finished run; `outcome` is `complete` or an error kind
    pub fn finished(outcome: &'static str, duration_secs: f64) {
        ::metrics::counter!(MetricName::RunsTotal.as_str(), "outcome" => outcome).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(duration_secs);
    }
}
