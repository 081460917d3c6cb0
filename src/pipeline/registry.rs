use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::FixesConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::pipeline::stages::{
    AddressStage, BarangayMatchStage, DivisionsStage, EnrollmentStage, GeoStage, LocationsStage,
    MetaPsgcStage, MunicipalityMatchStage, ProvHucMatchStage, PsgcStage, RegionMatchStage,
    SchoolLevelsStage,
};

/// Static registration list of pipeline stages.
///
/// Keeps a `table -> producing stage` index that is checked on every
/// registration, so duplicate producers fail before anything runs.
#[derive(Default)]
pub struct StageRegistry {
    stages: Vec<Box<dyn PipelineStage>>,
    producers: BTreeMap<String, usize>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed stage set for location resolution
    pub fn standard(config: Arc<FixesConfig>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(PsgcStage::new()))?;
        registry.register(Box::new(LocationsStage::new(config.clone())))?;
        registry.register(Box::new(RegionMatchStage::new(config.clone())))?;
        registry.register(Box::new(ProvHucMatchStage::new(config.clone())))?;
        registry.register(Box::new(MunicipalityMatchStage::new(config.clone())))?;
        registry.register(Box::new(BarangayMatchStage::new(config.clone())))?;
        registry.register(Box::new(MetaPsgcStage::new(config)))?;
        registry.register(Box::new(AddressStage::new()))?;
        registry.register(Box::new(DivisionsStage::new()))?;
        Ok(registry)
    }

    /// Add the opt-in enrollment unpivot and offered-levels stages
    pub fn with_enrollment(mut self) -> Result<Self> {
        self.register(Box::new(EnrollmentStage::new()))?;
        self.register(Box::new(SchoolLevelsStage::new()))?;
        Ok(self)
    }

    /// Add the opt-in coordinate join stage
    pub fn with_geo(mut self) -> Result<Self> {
        self.register(Box::new(GeoStage::new()))?;
        Ok(self)
    }

    /// Register a stage, rejecting any output table already claimed
    pub fn register(&mut self, stage: Box<dyn PipelineStage>) -> Result<()> {
        let index = self.stages.len();
        let mut claimed: Vec<&'static str> = Vec::new();
        for table in stage.outputs() {
            if let Some(&owner) = self.producers.get(table) {
                return Err(PipelineError::DuplicateProducer {
                    table: table.to_string(),
                    first: self.stages[owner].name().to_string(),
                    second: stage.name().to_string(),
                });
            }
            if claimed.contains(&table) {
                return Err(PipelineError::DuplicateProducer {
                    table: table.to_string(),
                    first: stage.name().to_string(),
                    second: stage.name().to_string(),
                });
            }
            claimed.push(table);
        }

        for table in claimed {
            self.producers.insert(table.to_string(), index);
        }
        debug!("Registered stage {} at position {}", stage.name(), index);
        self.stages.push(stage);
        Ok(())
    }

    /// Stages in registration order
    pub fn stages(&self) -> &[Box<dyn PipelineStage>] {
        &self.stages
    }

    /// Index of the stage producing `table`, if any
    pub fn producer_of(&self, table: &str) -> Option<usize> {
        self.producers.get(table).copied()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
