use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::pipeline::table::Table;

/// Common trait for all pipeline stages
pub trait PipelineStage: Send + Sync {
    /// Get the name of this stage
    fn name(&self) -> &'static str;

    /// Tables (produced by other stages) this stage requires
    fn depends_on(&self) -> Vec<&'static str>;

    /// Tables this stage produces
    fn outputs(&self) -> Vec<&'static str>;

    /// Execute this stage against its declared inputs.
    ///
    /// Stages never write to the shared store; the orchestrator inserts
    /// the returned tables after validating them.
    fn execute(&self, ctx: &StageContext<'_>, inputs: &StageInputs) -> Result<StageOutput>;
}

/// Raw, already-parsed tables supplied by the external loader
#[derive(Debug, Default, Clone)]
pub struct SourceTables {
    tables: BTreeMap<String, Table>,
}

impl SourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, table: Table) -> Self {
        self.insert(name, table);
        self
    }

    pub fn insert(&mut self, name: &str, table: Table) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Fetch a raw table or fail with the missing name
    pub fn require(&self, name: &str) -> Result<&Table> {
        self.get(name)
            .ok_or_else(|| anyhow!("source table '{}' was not supplied", name))
    }
}

/// Per-run context handed to every stage
#[derive(Debug)]
pub struct StageContext<'a> {
    pub run_id: &'a str,
    pub sources: &'a SourceTables,
}

/// Input tables wired from the shared store, keyed by table name
#[derive(Debug, Default)]
pub struct StageInputs {
    tables: BTreeMap<String, Arc<Table>>,
}

impl StageInputs {
    pub fn new(tables: BTreeMap<String, Arc<Table>>) -> Self {
        Self { tables }
    }

    pub fn require(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| anyhow!("input table '{}' was not wired", name))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Counts a stage reports about its run (rows in, dropped, matched, ...)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageMetrics {
    values: BTreeMap<String, u64>,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: u64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn add(&mut self, name: &str, value: u64) {
        *self.values.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Result of executing a pipeline stage
#[derive(Debug, Default)]
pub struct StageOutput {
    pub tables: Vec<(String, Table)>,
    pub metrics: StageMetrics,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, table: Table) -> Self {
        self.tables.push((name.to_string(), table));
        self
    }

    pub fn with_metric(mut self, name: &str, value: u64) -> Self {
        self.metrics.set(name, value);
        self
    }

    pub fn with_metrics(mut self, metrics: StageMetrics) -> Self {
        for (name, value) in metrics.iter() {
            self.metrics.set(name, value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate() {
        let mut metrics = StageMetrics::new();
        metrics.add("rows_dropped", 2);
        metrics.add("rows_dropped", 3);
        metrics.set("rows_in", 10);
        assert_eq!(metrics.get("rows_dropped"), Some(5));
        assert_eq!(metrics.get("rows_in"), Some(10));
        assert_eq!(metrics.get("missing"), None);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let inputs = StageInputs::default();
        let err = inputs.require("psgc").unwrap_err();
        assert!(err.to_string().contains("psgc"));
    }

    #[test]
    fn test_source_tables_require() {
        let sources = SourceTables::new().with("psgc_source", Table::default());
        assert!(sources.require("psgc_source").is_ok());
        assert!(sources.require("locations_source").is_err());
    }
}
