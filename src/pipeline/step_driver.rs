use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use crate::app::ports::{ArtifactStorePort, ProvenanceSinkPort};
use crate::artifact::ArtifactReference;
use crate::config::{CleaningConfig, StepOptions};
use crate::constants::JOB_TYPE;
use crate::error::{Result, StepError};
use crate::observability::metrics;
use crate::provenance::ProvenanceRecord;
use crate::run_context::RunContext;
use crate::transform;

/// Lifecycle of one step execution. States only move forward; `Failed` is
/// terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Initialized,
    Fetched,
    Transformed,
    Published,
    Recorded,
    Complete,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Complete | StepState::Failed)
    }

    fn next(&self) -> Option<StepState> {
        match self {
            StepState::Initialized => Some(StepState::Fetched),
            StepState::Fetched => Some(StepState::Transformed),
            StepState::Transformed => Some(StepState::Published),
            StepState::Published => Some(StepState::Recorded),
            StepState::Recorded => Some(StepState::Complete),
            StepState::Complete | StepState::Failed => None,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Initialized => "initialized",
            StepState::Fetched => "fetched",
            StepState::Transformed => "transformed",
            StepState::Published => "published",
            StepState::Recorded => "recorded",
            StepState::Complete => "complete",
            StepState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drives fetch -> transform -> publish -> record for a single execution.
///
/// A driver is single-use: once it reaches a terminal state it will not run
/// again. Re-invoke the step with a fresh driver.
pub struct StepDriver {
    store: Arc<dyn ArtifactStorePort>,
    provenance: Arc<dyn ProvenanceSinkPort>,
    state: StepState,
    history: Vec<StepState>,
}

impl StepDriver {
    pub fn new(store: Arc<dyn ArtifactStorePort>, provenance: Arc<dyn ProvenanceSinkPort>) -> Self {
        Self {
            store,
            provenance,
            state: StepState::Initialized,
            history: vec![StepState::Initialized],
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[StepState] {
        &self.history
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(from = %self.state, to = %next, "step transition");
            self.state = next;
            self.history.push(next);
        }
    }

    fn fail(&mut self, err: &StepError) {
        if !self.state.is_terminal() {
            debug!(from = %self.state, error = %err, "step failed");
            self.state = StepState::Failed;
            self.history.push(StepState::Failed);
        }
    }

    /// Resolve raw options first, then run. Configuration problems fail here
    /// without touching the store.
    pub fn run_with_options(&mut self, options: &StepOptions) -> Result<ProvenanceRecord> {
        match options.resolve() {
            Ok((config, input)) => self.run(&config, &input),
            Err(e) => {
                self.fail(&e);
                metrics::run::finished(e.kind(), 0.0);
                error!("Invalid step configuration: {}", e);
                Err(e)
            }
        }
    }

    /// Execute the whole state machine synchronously.
    pub fn run(&mut self, config: &CleaningConfig, input: &ArtifactReference) -> Result<ProvenanceRecord> {
        if self.state != StepState::Initialized {
            return Err(StepError::Configuration(format!(
                "step driver already used (state: {}); create a new driver to re-run",
                self.state
            )));
        }

        let started = Instant::now();
        let mut ctx = RunContext::new(self.store.clone(), self.provenance.clone());
        let span = info_span!("basic_cleaning", run_id = %ctx.run_id());
        let _enter = span.enter();

        info!(
            job_type = JOB_TYPE,
            input = %input,
            output = config.output_artifact_name(),
            min_price = config.min_price(),
            max_price = config.max_price(),
            "Starting cleaning step"
        );

        let result = self.execute(&mut ctx, config, input);
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(record) => {
                metrics::run::finished("complete", elapsed);
                info!(
                    output = %record.output_reference,
                    rows_in = record.report.rows_in,
                    rows_kept = record.report.rows_kept,
                    "Cleaning step complete"
                );
            }
            Err(e) => {
                self.fail(e);
                metrics::run::finished(e.kind(), elapsed);
                match e {
                    StepError::ProvenanceWrite { output, .. } => error!(
                        output = %output,
                        "Artifact published without recorded lineage; reconcile manually, do not retry: {}",
                        e
                    ),
                    _ => error!(retryable = e.is_retryable(), "Cleaning step failed: {}", e),
                }
            }
        }
        result
    }

    fn execute(
        &mut self,
        ctx: &mut RunContext,
        config: &CleaningConfig,
        input: &ArtifactReference,
    ) -> Result<ProvenanceRecord> {
        let (input_ref, table) = ctx.fetch(input)?;
        self.advance();

        let (cleaned, report) = transform::clean(&table, config)?;
        metrics::transform::report(&report);
        if report.rows_dropped() > 0 {
            info!(
                missing_price = report.dropped_missing_price,
                invalid_price = report.dropped_invalid_price,
                out_of_range = report.dropped_out_of_range,
                "Dropped rows"
            );
        }
        if report.unknown_dates > 0 {
            warn!(count = report.unknown_dates, "last_review values replaced with unknown-date sentinel");
        }
        self.advance();

        let output_ref = ctx.publish(
            &cleaned,
            config.output_artifact_name(),
            config.output_type(),
            config.output_description(),
        )?;
        self.advance();

        let record = ctx.record_provenance(&input_ref, &output_ref, config, report)?;
        self.advance();

        self.advance();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory::{InMemoryArtifactStore, InMemoryProvenanceSink};

    fn driver() -> (Arc<InMemoryArtifactStore>, Arc<InMemoryProvenanceSink>, StepDriver) {
        let store = Arc::new(InMemoryArtifactStore::new());
        let sink = Arc::new(InMemoryProvenanceSink::new());
        let driver = StepDriver::new(store.clone(), sink.clone());
        (store, sink, driver)
    }

    fn config() -> CleaningConfig {
        CleaningConfig::new(0.0, 100.0, "clean_sample.csv", "clean_sample", "cleaned").unwrap()
    }

    #[test]
    fn successful_run_visits_every_state_in_order() {
        let (store, _, mut d) = driver();
        let input = store.seed("sample.csv", "raw_data", b"price,last_review\n50,2019-01-01\n").unwrap();
        d.run(&config(), &input).unwrap();
        assert_eq!(
            d.history(),
            &[
                StepState::Initialized,
                StepState::Fetched,
                StepState::Transformed,
                StepState::Published,
                StepState::Recorded,
                StepState::Complete,
            ]
        );
    }

    #[test]
    fn driver_is_single_use() {
        let (store, sink, mut d) = driver();
        let input = store.seed("sample.csv", "raw_data", b"price,last_review\n50,2019-01-01\n").unwrap();
        d.run(&config(), &input).unwrap();
        assert!(matches!(d.run(&config(), &input), Err(StepError::Configuration(_))));
        assert_eq!(d.state(), StepState::Complete);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn schema_failure_stops_after_fetch() {
        let (store, _, mut d) = driver();
        let input = store.seed("sample.csv", "raw_data", b"cost,last_review\n50,2019-01-01\n").unwrap();
        assert!(matches!(d.run(&config(), &input), Err(StepError::Schema(_))));
        assert_eq!(d.history(), &[StepState::Initialized, StepState::Fetched, StepState::Failed]);
        assert!(store.versions("clean_sample.csv").unwrap().is_empty());
    }

    #[test]
    fn publish_failure_leaves_nothing_under_the_output_name() {
        let (store, sink, mut d) = driver();
        let input = store.seed("sample.csv", "raw_data", b"price,last_review\n50,2019-01-01\n").unwrap();
        store.fail_next_publish();
        let err = d.run(&config(), &input).unwrap_err();
        assert!(matches!(err, StepError::Store(_)));
        assert!(err.is_retryable());
        assert_eq!(d.history().last(), Some(&StepState::Failed));
        assert!(!d.history().contains(&StepState::Published));
        assert!(store.versions("clean_sample.csv").unwrap().is_empty());
        assert!(sink.records().is_empty());
    }

    #[test]
    fn invalid_options_fail_before_any_fetch() {
        let (store, _, mut d) = driver();
        let options = StepOptions {
            input_artifact: Some("sample.csv:latest".into()),
            output_artifact: Some("clean_sample.csv".into()),
            output_type: Some("clean_sample".into()),
            output_description: Some("cleaned".into()),
            min_price: Some(100.0),
            max_price: Some(0.0),
        };
        assert!(matches!(d.run_with_options(&options), Err(StepError::Configuration(_))));
        assert_eq!(store.fetch_count(), 0);
        assert_eq!(d.state(), StepState::Failed);
    }
}
