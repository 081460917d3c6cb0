use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use super::table_of;
use crate::config::FixesConfig;
use crate::constants::{SOURCE_LOCATIONS, TABLE_LOCATIONS};
use crate::observability::metrics::resolver;
use crate::pipeline::processing::location::LocationRecord;
use crate::pipeline::processing::overrides::{apply_pre_resolution, PreResolutionStats};
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Loads raw location records, tidies their text and applies the
/// pre-resolution corrections
pub struct LocationsStage {
    config: Arc<FixesConfig>,
}

impl LocationsStage {
    pub fn new(config: Arc<FixesConfig>) -> Self {
        Self { config }
    }
}

impl PipelineStage for LocationsStage {
    fn name(&self) -> &'static str {
        "locations"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_LOCATIONS]
    }

    fn execute(&self, ctx: &StageContext<'_>, _inputs: &StageInputs) -> Result<StageOutput> {
        let mut records: Vec<LocationRecord> = ctx.sources.require(SOURCE_LOCATIONS)?.to_records()?;

        let mut stats = PreResolutionStats::default();
        for record in records.iter_mut() {
            record.tidy_text();
            apply_pre_resolution(record, &self.config, &mut stats);
        }

        let fixes = [
            ("provincial_muni_fixes", stats.provincial_muni_fixes),
            ("municipality_fixes", stats.municipality_fixes),
            ("province_fixes_by_record_id", stats.province_fixes_by_record_id),
            ("special_fixes", stats.special_fixes),
            ("region_assignment", stats.region_assignment),
            ("province_split", stats.province_split),
        ];
        let mut output = StageOutput::new()
            .with_table(TABLE_LOCATIONS, table_of(TABLE_LOCATIONS, &records)?)
            .with_metric("rows_in", records.len() as u64);
        for (rule, count) in fixes {
            resolver::override_applied(rule, count);
            output = output.with_metric(rule, count as u64);
        }

        info!("📍 Loaded {} location records", records.len());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvincialMuniFix;
    use crate::pipeline::stage::SourceTables;
    use crate::pipeline::stages::fixtures;
    use crate::pipeline::table::Table;

    #[test]
    fn test_tidies_then_corrects() {
        let mut row = fixtures::location_row();
        row["municipality"] = serde_json::json!("  Bacara  ");
        let sources = SourceTables::new().with(
            SOURCE_LOCATIONS,
            Table::from_rows(vec![row.as_object().cloned().unwrap()]),
        );
        let config = FixesConfig {
            provincial_muni_fixes: vec![ProvincialMuniFix {
                province: "Ilocos Norte".to_string(),
                municipality: "Bacara".to_string(),
                corrected: "Bacarra".to_string(),
            }],
            ..FixesConfig::default()
        };
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };

        let output = LocationsStage::new(Arc::new(config))
            .execute(&ctx, &StageInputs::default())
            .unwrap();
        assert_eq!(output.metrics.get("provincial_muni_fixes"), Some(1));
        let records: Vec<LocationRecord> = output.tables[0].1.to_records().unwrap();
        assert_eq!(records[0].municipality.as_deref(), Some("Bacarra"));
        assert_eq!(records[0].record_id, "100001");
    }
}
