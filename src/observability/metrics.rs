//! Metrics for the location-resolution pipeline
//!
//! Recording goes through the `metrics` facade using Prometheus naming
//! conventions. Without an installed recorder every call is a no-op, so
//! library users pay nothing unless they opt in with [`init`].

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Pipeline metrics
    PipelineRunsStarted,
    PipelineRunsCompleted,
    PipelineRunsFailed,
    PipelineRunDuration,
    PipelineStagesCompleted,
    PipelineStageDuration,
    PipelineTableRows,
    PipelineSchemaViolations,

    // Resolver metrics
    ResolverRecordsMatched,
    ResolverRecordsUnmatched,
    ResolverRecordsExcluded,
    ResolverOverridesApplied,
    ResolverBackfilled,

    // Address metrics
    AddressRecordsHashed,
    AddressUniqueAddresses,

    // Enrollment metrics
    EnrollmentRowsEmitted,
    EnrollmentRowsInvalid,
    EnrollmentRowsDropped,
    EnrollmentLevelRows,
    EnrollmentLevelsUnknown,

    // Geo metrics
    GeoRecordsLocated,
    GeoRecordsUnlocated,
}

/// Kind of instrument a metric is recorded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    /// Get the metric name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            // Pipeline metrics
            MetricName::PipelineRunsStarted => "psgc_pipeline_runs_started_total",
            MetricName::PipelineRunsCompleted => "psgc_pipeline_runs_completed_total",
            MetricName::PipelineRunsFailed => "psgc_pipeline_runs_failed_total",
            MetricName::PipelineRunDuration => "psgc_pipeline_run_duration_seconds",
            MetricName::PipelineStagesCompleted => "psgc_pipeline_stages_completed_total",
            MetricName::PipelineStageDuration => "psgc_pipeline_stage_duration_seconds",
            MetricName::PipelineTableRows => "psgc_pipeline_table_rows",
            MetricName::PipelineSchemaViolations => "psgc_pipeline_schema_violations_total",

            // Resolver metrics
            MetricName::ResolverRecordsMatched => "psgc_resolver_records_matched_total",
            MetricName::ResolverRecordsUnmatched => "psgc_resolver_records_unmatched_total",
            MetricName::ResolverRecordsExcluded => "psgc_resolver_records_excluded_total",
            MetricName::ResolverOverridesApplied => "psgc_resolver_overrides_applied_total",
            MetricName::ResolverBackfilled => "psgc_resolver_backfilled_total",

            // Address metrics
            MetricName::AddressRecordsHashed => "psgc_address_records_hashed_total",
            MetricName::AddressUniqueAddresses => "psgc_address_unique_addresses",

            // Enrollment metrics
            MetricName::EnrollmentRowsEmitted => "psgc_enrollment_rows_emitted_total",
            MetricName::EnrollmentRowsInvalid => "psgc_enrollment_rows_invalid_total",
            MetricName::EnrollmentRowsDropped => "psgc_enrollment_rows_dropped_total",
            MetricName::EnrollmentLevelRows => "psgc_enrollment_level_rows_total",
            MetricName::EnrollmentLevelsUnknown => "psgc_enrollment_levels_unknown_total",

            // Geo metrics
            MetricName::GeoRecordsLocated => "psgc_geo_records_located_total",
            MetricName::GeoRecordsUnlocated => "psgc_geo_records_unlocated_total",
        }
    }

    /// Get all metric names as an iterator
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            PipelineRunsStarted,
            PipelineRunsCompleted,
            PipelineRunsFailed,
            PipelineRunDuration,
            PipelineStagesCompleted,
            PipelineStageDuration,
            PipelineTableRows,
            PipelineSchemaViolations,
            ResolverRecordsMatched,
            ResolverRecordsUnmatched,
            ResolverRecordsExcluded,
            ResolverOverridesApplied,
            ResolverBackfilled,
            AddressRecordsHashed,
            AddressUniqueAddresses,
            EnrollmentRowsEmitted,
            EnrollmentRowsInvalid,
            EnrollmentRowsDropped,
            EnrollmentLevelRows,
            EnrollmentLevelsUnknown,
            GeoRecordsLocated,
            GeoRecordsUnlocated,
        ]
        .into_iter()
    }

    /// Returns (phase, description, unit)
    pub fn metadata(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            MetricName::PipelineRunsStarted => ("pipeline", "Pipeline runs started", None),
            MetricName::PipelineRunsCompleted => ("pipeline", "Pipeline runs completed", None),
            MetricName::PipelineRunsFailed => ("pipeline", "Pipeline runs aborted by an error", None),
            MetricName::PipelineRunDuration => ("pipeline", "Whole-run duration", Some("s")),
            MetricName::PipelineStagesCompleted => ("pipeline", "Stages completed, by stage", None),
            MetricName::PipelineStageDuration => ("pipeline", "Stage duration, by stage", Some("s")),
            MetricName::PipelineTableRows => ("pipeline", "Rows in each accepted table", Some("rows")),
            MetricName::PipelineSchemaViolations => ("pipeline", "Tables rejected by their schema", None),

            MetricName::ResolverRecordsMatched => ("resolver", "Records matched, by level", None),
            MetricName::ResolverRecordsUnmatched => ("resolver", "Records left unmatched, by level", None),
            MetricName::ResolverRecordsExcluded => ("resolver", "Records intentionally excluded at the region level", None),
            MetricName::ResolverOverridesApplied => ("resolver", "Manual override rules applied, by rule", None),
            MetricName::ResolverBackfilled => ("resolver", "Records completed by the barangay backfill", None),

            MetricName::AddressRecordsHashed => ("address", "Records hashed into the address dimension", None),
            MetricName::AddressUniqueAddresses => ("address", "Distinct addresses in the last run", None),

            MetricName::EnrollmentRowsEmitted => ("enrollment", "Long-format enrollment rows emitted", None),
            MetricName::EnrollmentRowsInvalid => ("enrollment", "Counts that failed to parse", None),
            MetricName::EnrollmentRowsDropped => ("enrollment", "Null or zero counts dropped", None),
            MetricName::EnrollmentLevelRows => ("enrollment", "Offered-level rows emitted", None),
            MetricName::EnrollmentLevelsUnknown => ("enrollment", "Offered-level rows without a flag", None),

            MetricName::GeoRecordsLocated => ("geo", "Records joined to coordinates", None),
            MetricName::GeoRecordsUnlocated => ("geo", "Records with no coordinate row", None),
        }
    }

    /// Infer metric type from metric name patterns
    pub fn metric_type(&self) -> MetricType {
        let name = self.as_str();
        if name.ends_with("_total") {
            MetricType::Counter
        } else if name.ends_with("_seconds") {
            MetricType::Histogram
        } else {
            MetricType::Gauge
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), String> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    let _ = METRICS_HANDLE.set(handle);
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current snapshot in Prometheus text format
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Records elapsed seconds into a histogram when dropped
pub struct TimingGuard {
    start: Instant,
    metric: MetricName,
    stage: Option<String>,
}

impl TimingGuard {
    pub fn new(metric: MetricName) -> Self {
        Self {
            start: Instant::now(),
            metric,
            stage: None,
        }
    }

    pub fn for_stage(metric: MetricName, stage: &str) -> Self {
        Self {
            stage: Some(stage.to_string()),
            ..Self::new(metric)
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let secs = self.elapsed_secs();
        match self.stage.take() {
            Some(stage) => ::metrics::histogram!(self.metric.as_str(), "stage" => stage).record(secs),
            None => ::metrics::histogram!(self.metric.as_str()).record(secs),
        }
    }
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::{MetricName, TimingGuard};

    pub fn run_started() {
        ::metrics::counter!(MetricName::PipelineRunsStarted.as_str()).increment(1);
    }

    pub fn run_completed(secs: f64) {
        ::metrics::counter!(MetricName::PipelineRunsCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PipelineRunDuration.as_str()).record(secs);
    }

    pub fn run_failed(stage: &str) {
        ::metrics::counter!(MetricName::PipelineRunsFailed.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    /// Start timing a stage; the duration is recorded when the guard drops
    pub fn time_stage(stage: &str) -> TimingGuard {
        TimingGuard::for_stage(MetricName::PipelineStageDuration, stage)
    }

    pub fn stage_completed(stage: &str) {
        ::metrics::counter!(MetricName::PipelineStagesCompleted.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    pub fn table_rows(table: &str, rows: usize) {
        ::metrics::gauge!(MetricName::PipelineTableRows.as_str(), "table" => table.to_string())
            .set(rows as f64);
    }

    pub fn schema_violation(table: &str) {
        ::metrics::counter!(MetricName::PipelineSchemaViolations.as_str(), "table" => table.to_string())
            .increment(1);
    }
}

// ============================================================================
// Resolver Metrics
// ============================================================================

pub mod resolver {
    use super::MetricName;

    /// Record match outcomes for one hierarchy level
    pub fn level_outcome(level: &'static str, matched: usize, unmatched: usize) {
        ::metrics::counter!(MetricName::ResolverRecordsMatched.as_str(), "level" => level)
            .increment(matched as u64);
        ::metrics::counter!(MetricName::ResolverRecordsUnmatched.as_str(), "level" => level)
            .increment(unmatched as u64);
    }

    pub fn excluded(count: usize) {
        ::metrics::counter!(MetricName::ResolverRecordsExcluded.as_str()).increment(count as u64);
    }

    pub fn override_applied(rule: &'static str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::ResolverOverridesApplied.as_str(), "rule" => rule)
                .increment(count as u64);
        }
    }

    pub fn backfilled(count: usize) {
        ::metrics::counter!(MetricName::ResolverBackfilled.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Address Metrics
// ============================================================================

pub mod address {
    use super::MetricName;

    pub fn canonicalized(records: usize, unique: usize) {
        ::metrics::counter!(MetricName::AddressRecordsHashed.as_str()).increment(records as u64);
        ::metrics::gauge!(MetricName::AddressUniqueAddresses.as_str()).set(unique as f64);
    }
}

// ============================================================================
// Enrollment Metrics
// ============================================================================

pub mod enrollment {
    use super::MetricName;

    pub fn unpivoted(emitted: usize, invalid: usize, dropped: usize) {
        ::metrics::counter!(MetricName::EnrollmentRowsEmitted.as_str()).increment(emitted as u64);
        ::metrics::counter!(MetricName::EnrollmentRowsInvalid.as_str()).increment(invalid as u64);
        ::metrics::counter!(MetricName::EnrollmentRowsDropped.as_str()).increment(dropped as u64);
    }

    pub fn levels(rows: usize, unknown: usize) {
        ::metrics::counter!(MetricName::EnrollmentLevelRows.as_str()).increment(rows as u64);
        ::metrics::counter!(MetricName::EnrollmentLevelsUnknown.as_str()).increment(unknown as u64);
    }
}

// ============================================================================
// Geo Metrics
// ============================================================================

pub mod geo {
    use super::MetricName;

    pub fn attached(located: usize, unlocated: usize) {
        ::metrics::counter!(MetricName::GeoRecordsLocated.as_str()).increment(located as u64);
        ::metrics::counter!(MetricName::GeoRecordsUnlocated.as_str()).increment(unlocated as u64);
    }
}
