use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use super::{location_input, reference_input, table_of};
use crate::config::FixesConfig;
use crate::constants::{TABLE_LOCATIONS_BRGY, TABLE_META_PSGC, TABLE_PSGC};
use crate::observability::metrics::resolver;
use crate::pipeline::processing::overrides::{apply_backfill, apply_barangay_corrections, title_case};
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Post-resolution fixes: barangay corrections, the backfill, and province
/// title-casing
pub struct MetaPsgcStage {
    config: Arc<FixesConfig>,
}

impl MetaPsgcStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self { config }
    }
}

impl PipelineStage for MetaPsgcStage {
    fn name(&self) -> &'static str {
        "meta_psgc"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC, TABLE_LOCATIONS_BRGY]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_META_PSGC]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let reference = reference_input(inputs)?;
        let mut records = location_input(inputs, TABLE_LOCATIONS_BRGY)?;

        let corrected = apply_barangay_corrections(&mut records, &reference, &self.config.barangay_corrections);
        let backfilled = match &self.config.backfill {
            Some(rule) => apply_backfill(&mut records, &reference, rule),
            None => 0,
        };
        for record in records.iter_mut() {
            record.province = record.province.as_deref().map(title_case);
        }

        let incomplete = records
            .iter()
            .filter(|r| r.codes().iter().any(Option::is_none))
            .count();
        info!(
            "🩹 {} barangay corrections, {} backfilled, {} records still incomplete",
            corrected, backfilled, incomplete
        );
        resolver::override_applied("barangay_corrections", corrected);
        resolver::backfilled(backfilled);

        Ok(StageOutput::new()
            .with_table(TABLE_META_PSGC, table_of(TABLE_META_PSGC, &records)?)
            .with_metric("rows_in", records.len() as u64)
            .with_metric("barangay_corrections", corrected as u64)
            .with_metric("backfilled", backfilled as u64)
            .with_metric("rows_incomplete", incomplete as u64))
    }
}
