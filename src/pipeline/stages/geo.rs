use anyhow::Result;
use tracing::{info, warn};

use super::table_of;
use crate::constants::{SOURCE_GEO, TABLE_ADDRESS, TABLE_GEO, TABLE_META_WITH_HASH};
use crate::observability::metrics::geo;
use crate::pipeline::processing::address::{AddressRow, HashedRecord};
use crate::pipeline::processing::geo::{attach_coordinates, coordinate_index, GeoStats};
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Opt-in stage attaching longitude/latitude to every hashed record
#[derive(Debug, Default)]
pub struct GeoStage;

impl GeoStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for GeoStage {
    fn name(&self) -> &'static str {
        "geo"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_META_WITH_HASH, TABLE_ADDRESS]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_GEO]
    }

    fn execute(&self, ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let source = ctx.sources.require(SOURCE_GEO)?;
        let records: Vec<HashedRecord> = inputs.require(TABLE_META_WITH_HASH)?.to_records()?;
        let addresses: Vec<AddressRow> = inputs.require(TABLE_ADDRESS)?.to_records()?;
        let rows_in = records.len();

        let mut stats = GeoStats::default();
        let index = coordinate_index(source, &mut stats);
        let rows = attach_coordinates(records, &addresses, &index, &mut stats);

        info!("📍 Located {} of {} records", stats.located, rows_in);
        if stats.invalid_values > 0 {
            warn!("⚠️ {} coordinate values were not numbers", stats.invalid_values);
        }
        geo::attached(stats.located, stats.unlocated);

        Ok(StageOutput::new()
            .with_table(TABLE_GEO, table_of(TABLE_GEO, &rows)?)
            .with_metric("rows_in", rows_in as u64)
            .with_metric("rows_located", stats.located as u64)
            .with_metric("rows_unlocated", stats.unlocated as u64)
            .with_metric("source_rows_without_id", stats.rows_without_id as u64)
            .with_metric("source_duplicate_ids", stats.duplicate_ids as u64)
            .with_metric("invalid_values", stats.invalid_values as u64))
    }
}
