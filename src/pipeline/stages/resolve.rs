//! One stage per hierarchy level. Each reads the previous level's table and
//! the prepared reference, and emits a new table with its code column filled.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::{location_input, reference_input, table_of};
use crate::config::FixesConfig;
use crate::constants::{
    TABLE_LOCATIONS, TABLE_LOCATIONS_BRGY, TABLE_LOCATIONS_MUNI, TABLE_LOCATIONS_PROVHUC,
    TABLE_LOCATIONS_REGION, TABLE_PSGC,
};
use crate::observability::metrics::resolver;
use crate::pipeline::processing::names::NameNormalizer;
use crate::pipeline::processing::resolve::{
    resolve_barangays, resolve_municipalities, resolve_provhuc, resolve_regions, LevelStats,
};
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

pub struct RegionMatchStage {
    config: Arc<FixesConfig>,
}

impl RegionMatchStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self { config }
    }
}

impl PipelineStage for RegionMatchStage {
    fn name(&self) -> &'static str {
        "region_match"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC, TABLE_LOCATIONS]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_LOCATIONS_REGION]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let reference = reference_input(inputs)?;
        let records = location_input(inputs, TABLE_LOCATIONS)?;
        let rows_in = records.len();

        let (kept, stats) = resolve_regions(records, &reference, &self.config);
        let dropped = stats.excluded + stats.unmatched;
        if dropped > 0 {
            warn!(
                "⚠️ Dropped {} records at region match ({} excluded, {} unmatched)",
                dropped, stats.excluded, stats.unmatched
            );
        }
        resolver::level_outcome("region", stats.matched, stats.unmatched);
        resolver::excluded(stats.excluded);

        Ok(StageOutput::new()
            .with_table(TABLE_LOCATIONS_REGION, table_of(TABLE_LOCATIONS_REGION, &kept)?)
            .with_metric("rows_in", rows_in as u64)
            .with_metric("rows_out", kept.len() as u64)
            .with_metric("rows_excluded", stats.excluded as u64)
            .with_metric("rows_unmatched", stats.unmatched as u64)
            .with_metric("rows_dropped", dropped as u64))
    }
}

pub struct ProvHucMatchStage {
    config: Arc<FixesConfig>,
}

impl ProvHucMatchStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self { config }
    }
}

impl PipelineStage for ProvHucMatchStage {
    fn name(&self) -> &'static str {
        "provhuc_match"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC, TABLE_LOCATIONS_REGION]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_LOCATIONS_PROVHUC]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let reference = reference_input(inputs)?;
        let mut records = location_input(inputs, TABLE_LOCATIONS_REGION)?;

        let stats = resolve_provhuc(&mut records, &reference, &self.config.normalizer(), &self.config);
        let matched = records.len() - stats.unmatched;
        info!(
            "🏙️ Province/HUC: {} urbanized city, {} sub-municipality, {} exception, {} province, {} overridden",
            stats.urbanized_city,
            stats.sub_municipality,
            stats.exception_municipality,
            stats.province,
            stats.overridden
        );
        resolver::level_outcome("provhuc", matched, stats.unmatched);
        resolver::override_applied("province_code_overrides", stats.overridden);

        Ok(StageOutput::new()
            .with_table(TABLE_LOCATIONS_PROVHUC, table_of(TABLE_LOCATIONS_PROVHUC, &records)?)
            .with_metric("rows_in", records.len() as u64)
            .with_metric("matched_urbanized_city", stats.urbanized_city as u64)
            .with_metric("matched_sub_municipality", stats.sub_municipality as u64)
            .with_metric("matched_exception_municipality", stats.exception_municipality as u64)
            .with_metric("matched_province", stats.province as u64)
            .with_metric("overridden", stats.overridden as u64)
            .with_metric("rows_unmatched", stats.unmatched as u64))
    }
}

/// Stage metrics shared by the municipality and barangay levels
fn level_output(level: &'static str, rows: usize, stats: LevelStats) -> StageOutput {
    info!("🔎 {} match: {} matched, {} unmatched", level, stats.matched, stats.unmatched);
    resolver::level_outcome(level, stats.matched, stats.unmatched);
    StageOutput::new()
        .with_metric("rows_in", rows as u64)
        .with_metric("rows_matched", stats.matched as u64)
        .with_metric("rows_unmatched", stats.unmatched as u64)
}

pub struct MunicipalityMatchStage {
    normalizer: NameNormalizer,
}

impl MunicipalityMatchStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self {
            normalizer: config.normalizer(),
        }
    }
}

impl PipelineStage for MunicipalityMatchStage {
    fn name(&self) -> &'static str {
        "muni_match"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC, TABLE_LOCATIONS_PROVHUC]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_LOCATIONS_MUNI]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let reference = reference_input(inputs)?;
        let mut records = location_input(inputs, TABLE_LOCATIONS_PROVHUC)?;
        let stats = resolve_municipalities(&mut records, &reference, &self.normalizer);
        Ok(level_output("municipality", records.len(), stats)
            .with_table(TABLE_LOCATIONS_MUNI, table_of(TABLE_LOCATIONS_MUNI, &records)?))
    }
}

pub struct BarangayMatchStage {
    normalizer: NameNormalizer,
}

impl BarangayMatchStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self {
            normalizer: config.normalizer(),
        }
    }
}

impl PipelineStage for BarangayMatchStage {
    fn name(&self) -> &'static str {
        "brgy_match"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC, TABLE_LOCATIONS_MUNI]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_LOCATIONS_BRGY]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let reference = reference_input(inputs)?;
        let mut records = location_input(inputs, TABLE_LOCATIONS_MUNI)?;
        let stats = resolve_barangays(&mut records, &reference, &self.normalizer);
        Ok(level_output("barangay", records.len(), stats)
            .with_table(TABLE_LOCATIONS_BRGY, table_of(TABLE_LOCATIONS_BRGY, &records)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::location::LocationRecord;
    use crate::pipeline::stage::SourceTables;
    use crate::pipeline::stages::fixtures;
    use crate::pipeline::table::Table;

    fn run(stage: &dyn PipelineStage, inputs: Vec<(&str, Table)>) -> StageOutput {
        let sources = SourceTables::new();
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };
        stage.execute(&ctx, &fixtures::inputs(inputs)).unwrap()
    }

    fn psgc() -> Table {
        table_of(TABLE_PSGC, &fixtures::reference()).unwrap()
    }

    #[test]
    fn test_levels_chain() {
        let config = Arc::new(FixesConfig::default());
        let locations = Table::from_rows(vec![fixtures::location_row().as_object().cloned().unwrap()]);

        let out = run(&RegionMatchStage::new(config.clone()), vec![(TABLE_PSGC, psgc()), (TABLE_LOCATIONS, locations)]);
        let region = out.tables[0].1.clone();
        let out = run(&ProvHucMatchStage::new(config.clone()), vec![(TABLE_PSGC, psgc()), (TABLE_LOCATIONS_REGION, region)]);
        let provhuc = out.tables[0].1.clone();
        let out = run(&MunicipalityMatchStage::new(config.clone()), vec![(TABLE_PSGC, psgc()), (TABLE_LOCATIONS_PROVHUC, provhuc)]);
        let muni = out.tables[0].1.clone();
        let out = run(&BarangayMatchStage::new(config), vec![(TABLE_PSGC, psgc()), (TABLE_LOCATIONS_MUNI, muni)]);
        assert_eq!(out.metrics.get("rows_matched"), Some(1));

        let records: Vec<LocationRecord> = out.tables[0].1.to_records().unwrap();
        assert_eq!(
            records[0].codes(),
            [Some("0100000000"), Some("0100100000"), Some("0100100100"), Some("0100100101")]
        );
        assert_eq!(records[0].extra_text("division").as_deref(), Some("Ilocos Norte"));
    }

    #[test]
    fn test_region_drops_are_counted() {
        let mut row = fixtures::location_row();
        row["region"] = serde_json::json!("Atlantis");
        let locations = Table::from_rows(vec![
            fixtures::location_row().as_object().cloned().unwrap(),
            row.as_object().cloned().unwrap(),
        ]);
        let out = run(
            &RegionMatchStage::new(Arc::new(FixesConfig::default())),
            vec![(TABLE_PSGC, psgc()), (TABLE_LOCATIONS, locations)],
        );
        assert_eq!(out.metrics.get("rows_in"), Some(2));
        assert_eq!(out.metrics.get("rows_out"), Some(1));
        assert_eq!(out.metrics.get("rows_unmatched"), Some(1));
        assert_eq!(out.metrics.get("rows_dropped"), Some(1));
    }
}
