use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::constants::SCHEMA_SAMPLE_ROWS;
use crate::error::{PipelineError, Result};
use crate::observability::metrics::pipeline as pipeline_metrics;
use crate::pipeline::registry::StageRegistry;
use crate::pipeline::scheduler;
use crate::pipeline::schema;
use crate::pipeline::stage::{PipelineStage, SourceTables, StageContext, StageInputs};
use crate::pipeline::storage::TableStore;
use crate::pipeline::table::Table;

/// Runs registered stages in dependency order against a shared table store
pub struct Pipeline {
    registry: StageRegistry,
    order: Vec<usize>,
}

/// Everything a successful run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Stage names in the order they ran
    pub stage_order: Vec<String>,
    pub tables: BTreeMap<String, Table>,
    /// Stage-reported counts keyed `"<stage>.<metric>"`
    pub metrics: BTreeMap<String, u64>,
}

impl PipelineOutput {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn metric(&self, stage: &str, name: &str) -> Option<u64> {
        self.metrics.get(&format!("{}.{}", stage, name)).copied()
    }
}

impl Pipeline {
    /// Build the graph and schedule it. Configuration errors surface here,
    /// before any stage executes.
    pub fn new(registry: StageRegistry) -> Result<Self> {
        let order = scheduler::schedule(&registry)?;
        Ok(Self { registry, order })
    }

    /// Stage names in execution order
    pub fn plan(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .map(|&i| self.registry.stages()[i].name())
            .collect()
    }

    /// Run every stage once. Any failure aborts the run with the stage named.
    pub fn execute(&self, sources: &SourceTables) -> Result<PipelineOutput> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let _entered = span.enter();

        let started_at = Utc::now();
        let clock = Instant::now();
        pipeline_metrics::run_started();
        info!("🚀 Starting pipeline run with {} stages", self.order.len());

        let ctx = StageContext {
            run_id: &run_id,
            sources,
        };
        let mut store = TableStore::new();
        let mut metrics = BTreeMap::new();
        let mut stage_order = Vec::with_capacity(self.order.len());

        for (step, &index) in self.order.iter().enumerate() {
            let stage = self.registry.stages()[index].as_ref();
            info!(
                "🔄 Executing stage {}/{}: {}",
                step + 1,
                self.order.len(),
                stage.name()
            );
            if let Err(e) = self.run_stage(stage, &ctx, &mut store, &mut metrics) {
                error!("❌ Stage '{}' aborted the run: {}", stage.name(), e);
                pipeline_metrics::run_failed(stage.name());
                return Err(e);
            }
            stage_order.push(stage.name().to_string());
        }

        let secs = clock.elapsed().as_secs_f64();
        pipeline_metrics::run_completed(secs);
        info!(
            "🎉 Pipeline run completed in {:.2}s: {} tables produced",
            secs,
            store.len()
        );

        Ok(PipelineOutput {
            run_id: run_id.clone(),
            started_at,
            completed_at: Utc::now(),
            stage_order,
            tables: store.into_tables(),
            metrics,
        })
    }

    fn run_stage(
        &self,
        stage: &dyn PipelineStage,
        ctx: &StageContext<'_>,
        store: &mut TableStore,
        metrics: &mut BTreeMap<String, u64>,
    ) -> Result<()> {
        let name = stage.name();
        let span = info_span!("stage", stage = name);
        let _entered = span.enter();
        let timer = pipeline_metrics::time_stage(name);

        let inputs = wire_inputs(stage, store)?;

        let output = stage
            .execute(ctx, &inputs)
            .map_err(|source| PipelineError::StageFailed {
                stage: name.to_string(),
                source,
            })?;

        let declared = stage.outputs();
        for (table_name, _) in &output.tables {
            if !declared.iter().any(|d| d == table_name) {
                return Err(PipelineError::StageFailed {
                    stage: name.to_string(),
                    source: anyhow::anyhow!("emitted undeclared table '{}'", table_name),
                });
            }
        }
        for expected in &declared {
            if !output.tables.iter().any(|(t, _)| t == expected) {
                return Err(PipelineError::StageFailed {
                    stage: name.to_string(),
                    source: anyhow::anyhow!("did not produce declared table '{}'", expected),
                });
            }
        }

        for (table_name, table) in output.tables {
            if store.contains(&table_name) {
                return Err(PipelineError::TableOverwrite {
                    stage: name.to_string(),
                    table: table_name,
                });
            }
            validate_table(name, &table_name, &table)?;

            let rows = table.len();
            pipeline_metrics::table_rows(&table_name, rows);
            if store.insert(&table_name, table).is_err() {
                return Err(PipelineError::TableOverwrite {
                    stage: name.to_string(),
                    table: table_name,
                });
            }
            info!("✅ {} accepted ({} rows)", table_name, rows);
        }

        for (metric, value) in output.metrics.iter() {
            metrics.insert(format!("{}.{}", name, metric), value);
        }
        if let Some(dropped) = output.metrics.get("rows_dropped").filter(|&d| d > 0) {
            warn!("⚠️ {} dropped {} rows", name, dropped);
        }

        pipeline_metrics::stage_completed(name);
        drop(timer);
        Ok(())
    }
}

/// Collect a stage's declared inputs from the store
fn wire_inputs(stage: &dyn PipelineStage, store: &TableStore) -> Result<StageInputs> {
    let mut tables: BTreeMap<String, Arc<Table>> = BTreeMap::new();
    let mut missing = Vec::new();
    for table in stage.depends_on() {
        match store.get(table) {
            Some(t) => {
                tables.insert(table.to_string(), Arc::clone(t));
            }
            None => missing.push(table.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::MissingInput {
            stage: stage.name().to_string(),
            tables: missing,
        });
    }
    Ok(StageInputs::new(tables))
}

/// Check a produced table against its declared contract, if it has one.
///
/// The error sample holds the offending rows, or the first rows when only
/// columns are missing.
pub fn validate_table(stage: &str, name: &str, table: &Table) -> Result<()> {
    let Some(contract) = schema::schema_for(name) else {
        return Ok(());
    };
    let violations = contract.validate(table);
    if violations.is_empty() {
        return Ok(());
    }

    pipeline_metrics::schema_violation(name);
    let offending = contract.offending_rows(table, SCHEMA_SAMPLE_ROWS);
    let sample = if offending.is_empty() {
        serde_json::to_string(table.head(SCHEMA_SAMPLE_ROWS))?
    } else {
        serde_json::to_string(&offending)?
    };
    Err(PipelineError::SchemaViolation {
        stage: stage.to_string(),
        table: name.to_string(),
        violations,
        sample,
    })
}
