use anyhow::Result;
use tracing::info;

use super::{location_input, table_of};
use crate::constants::{TABLE_ADDRESS, TABLE_DIVISIONS, TABLE_META_PSGC, TABLE_META_WITH_HASH};
use crate::observability::metrics::address;
use crate::pipeline::processing::address::canonicalize;
use crate::pipeline::processing::divisions::assign_division_ids;
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Builds the address dimension and joins it back onto the records
#[derive(Debug, Default)]
pub struct AddressStage;

impl AddressStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for AddressStage {
    fn name(&self) -> &'static str {
        "address"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_META_PSGC]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_ADDRESS, TABLE_META_WITH_HASH]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let records = location_input(inputs, TABLE_META_PSGC)?;
        let rows_in = records.len();
        let (addresses, hashed) = canonicalize(records);

        info!("🏠 {} records share {} unique addresses", rows_in, addresses.len());
        address::canonicalized(rows_in, addresses.len());

        Ok(StageOutput::new()
            .with_table(TABLE_ADDRESS, table_of(TABLE_ADDRESS, &addresses)?)
            .with_table(TABLE_META_WITH_HASH, table_of(TABLE_META_WITH_HASH, &hashed)?)
            .with_metric("rows_in", rows_in as u64)
            .with_metric("unique_addresses", addresses.len() as u64))
    }
}

/// Numbers school divisions per region
#[derive(Debug, Default)]
pub struct DivisionsStage;

impl DivisionsStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for DivisionsStage {
    fn name(&self) -> &'static str {
        "divisions"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_META_WITH_HASH]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_DIVISIONS]
    }

    fn execute(&self, _ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let records = location_input(inputs, TABLE_META_WITH_HASH)?;
        let divisions = assign_division_ids(&records);
        info!("🗂️ Numbered {} divisions", divisions.len());

        Ok(StageOutput::new()
            .with_table(TABLE_DIVISIONS, table_of(TABLE_DIVISIONS, &divisions)?)
            .with_metric("divisions", divisions.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::location::LocationRecord;
    use crate::pipeline::stage::SourceTables;
    use crate::pipeline::stages::fixtures;
    use serde_json::json;

    fn ctx_run(stage: &dyn PipelineStage, inputs: StageInputs) -> StageOutput {
        let sources = SourceTables::new();
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };
        stage.execute(&ctx, &inputs).unwrap()
    }

    #[test]
    fn test_address_then_divisions() {
        let mut a = LocationRecord::new("a");
        a.region_code = Some("0100000000".to_string());
        a.extra.insert("division".to_string(), json!("Ilocos Norte"));
        let mut b = a.clone();
        b.record_id = "b".to_string();

        let output = ctx_run(
            &AddressStage::new(),
            fixtures::inputs(vec![(TABLE_META_PSGC, table_of(TABLE_META_PSGC, &[a, b]).unwrap())]),
        );
        assert_eq!(output.metrics.get("unique_addresses"), Some(1));
        let (name, with_hash) = &output.tables[1];
        assert_eq!(name, TABLE_META_WITH_HASH);
        assert!(with_hash.rows.iter().all(|r| r["address_id"] == json!(1)));
        assert_eq!(with_hash.rows[0]["division"], json!("Ilocos Norte"));

        let output = ctx_run(
            &DivisionsStage::new(),
            fixtures::inputs(vec![(TABLE_META_WITH_HASH, with_hash.clone())]),
        );
        let divisions = &output.tables[0].1;
        assert_eq!(divisions.len(), 1);
        assert_eq!(divisions.rows[0]["division_id"], json!("0100000000-1"));
    }
}
