use anyhow::Result;
use tracing::{info, warn};

use super::table_of;
use crate::constants::{SOURCE_PSGC, TABLE_PSGC};
use crate::pipeline::processing::reference::prepare_reference;
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Prepares the geographic master list supplied as `psgc_source`
#[derive(Debug, Default)]
pub struct PsgcStage;

impl PsgcStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for PsgcStage {
    fn name(&self) -> &'static str {
        "psgc"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_PSGC]
    }

    fn execute(&self, ctx: &StageContext<'_>, _inputs: &StageInputs) -> Result<StageOutput> {
        let source = ctx.sources.require(SOURCE_PSGC)?;
        let (records, stats) = prepare_reference(&source.rows);

        let skipped = stats.invalid_code + stats.missing_level;
        if skipped > 0 {
            warn!("⚠️ Skipped {} reference rows without a usable code or level", skipped);
        }
        info!("📚 Prepared {} reference rows", stats.rows_out);

        Ok(StageOutput::new()
            .with_table(TABLE_PSGC, table_of(TABLE_PSGC, &records)?)
            .with_metric("rows_in", stats.rows_in as u64)
            .with_metric("rows_out", stats.rows_out as u64)
            .with_metric("rows_invalid_code", stats.invalid_code as u64)
            .with_metric("rows_missing_level", stats.missing_level as u64)
            .with_metric("provinces_renamed", stats.renamed_provinces as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::SourceTables;
    use crate::pipeline::table::Table;
    use serde_json::json;

    #[test]
    fn test_prepares_source_rows() {
        let rows = json!([
            {"id": 100000000, "name": "Region I", "geo": "Reg"},
            {"id": "x", "name": "Broken", "geo": "Prov"}
        ]);
        let table = Table::from_rows(rows.as_array().unwrap().iter().filter_map(|r| r.as_object().cloned()).collect());
        let sources = SourceTables::new().with(SOURCE_PSGC, table);
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };

        let output = PsgcStage::new().execute(&ctx, &StageInputs::default()).unwrap();
        assert_eq!(output.metrics.get("rows_out"), Some(1));
        assert_eq!(output.metrics.get("rows_invalid_code"), Some(1));
        let (name, table) = &output.tables[0];
        assert_eq!(name, TABLE_PSGC);
        assert_eq!(table.rows[0]["code"], json!("0100000000"));
        assert_eq!(table.rows[0]["level"], json!("Reg"));
    }

    #[test]
    fn test_missing_source_fails() {
        let sources = SourceTables::new();
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };
        assert!(PsgcStage::new().execute(&ctx, &StageInputs::default()).is_err());
    }
}
