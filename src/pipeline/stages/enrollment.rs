use anyhow::Result;
use tracing::info;

use super::table_of;
use crate::constants::{SOURCE_ENROLLMENT, TABLE_ENROLLMENT, TABLE_SCHOOL_LEVELS};
use crate::observability::metrics::enrollment;
use crate::pipeline::processing::enrollment::{unpivot, EnrollmentRow};
use crate::pipeline::processing::levels::offered_levels;
use crate::pipeline::stage::{PipelineStage, StageContext, StageInputs, StageOutput};

/// Opt-in stage reshaping wide enrollment counts into long rows
#[derive(Debug, Default)]
pub struct EnrollmentStage;

impl EnrollmentStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for EnrollmentStage {
    fn name(&self) -> &'static str {
        "enrollment"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_ENROLLMENT]
    }

    fn execute(&self, ctx: &StageContext<'_>, _inputs: &StageInputs) -> Result<StageOutput> {
        let source = ctx.sources.require(SOURCE_ENROLLMENT)?;
        let (rows, stats) = unpivot(source);

        info!("🎒 Unpivoted {} enrollment rows from {} schools", rows.len(), source.len());
        enrollment::unpivoted(stats.rows_emitted, stats.rows_invalid, stats.rows_dropped);

        Ok(StageOutput::new()
            .with_table(TABLE_ENROLLMENT, table_of(TABLE_ENROLLMENT, &rows)?)
            .with_metric("rows_in", source.len() as u64)
            .with_metric("rows_out", stats.rows_emitted as u64)
            .with_metric("rows_invalid", stats.rows_invalid as u64)
            .with_metric("rows_dropped", stats.rows_dropped as u64))
    }
}

/// Levels each school offers, one row per school year it reported enrollment
#[derive(Debug, Default)]
pub struct SchoolLevelsStage;

impl SchoolLevelsStage {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStage for SchoolLevelsStage {
    fn name(&self) -> &'static str {
        "school_levels"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec![TABLE_ENROLLMENT]
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![TABLE_SCHOOL_LEVELS]
    }

    fn execute(&self, ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput> {
        let source = ctx.sources.require(SOURCE_ENROLLMENT)?;
        let enrolled: Vec<EnrollmentRow> = inputs.require(TABLE_ENROLLMENT)?.to_records()?;
        let rows = offered_levels(source, &enrolled);
        let unknown = rows.iter().filter(|r| r.offered.is_none()).count();

        info!("🏫 Built {} offered-level rows ({} unknown)", rows.len(), unknown);
        enrollment::levels(rows.len(), unknown);

        Ok(StageOutput::new()
            .with_table(TABLE_SCHOOL_LEVELS, table_of(TABLE_SCHOOL_LEVELS, &rows)?)
            .with_metric("rows_out", rows.len() as u64)
            .with_metric("rows_unknown", unknown as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::SourceTables;
    use crate::pipeline::table::Table;
    use serde_json::json;

    #[test]
    fn test_unpivots_source() {
        let row = json!({"school_year": "2024-2025", "school_id": "300001", "g7_male": 40, "g7_female": "38"});
        let sources = SourceTables::new().with(
            SOURCE_ENROLLMENT,
            Table::from_rows(vec![row.as_object().cloned().unwrap()]),
        );
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };
        let output = EnrollmentStage::new().execute(&ctx, &StageInputs::default()).unwrap();
        assert_eq!(output.metrics.get("rows_out"), Some(2));
        assert_eq!(output.tables[0].1.len(), 2);
    }

    #[test]
    fn test_levels_follow_enrolled_years() {
        let row = json!({"school_year": "2024-2025", "school_id": "300001", "offers_es": "no", "offers_jhs": "yes", "g7_male": 40});
        let sources = SourceTables::new().with(
            SOURCE_ENROLLMENT,
            Table::from_rows(vec![row.as_object().cloned().unwrap()]),
        );
        let ctx = StageContext {
            run_id: "test",
            sources: &sources,
        };
        let unpivoted = EnrollmentStage::new().execute(&ctx, &StageInputs::default()).unwrap();
        let (name, table) = unpivoted.tables.into_iter().next().unwrap();
        let inputs = crate::pipeline::stages::fixtures::inputs(vec![(name.as_str(), table)]);

        let output = SchoolLevelsStage::new().execute(&ctx, &inputs).unwrap();
        assert_eq!(output.metrics.get("rows_out"), Some(3));
        assert_eq!(output.metrics.get("rows_unknown"), Some(1));
        let levels = &output.tables[0].1;
        assert_eq!(levels.rows[1]["level"], json!("jhs"));
        assert_eq!(levels.rows[1]["offered"], json!(true));
    }
}
