// Stage pipeline: typed tables, schema contracts, static stage registration,
// dependency scheduling and the orchestrator that runs it all

pub mod orchestrator;
pub mod processing;
pub mod registry;
pub mod scheduler;
pub mod schema;
pub mod stage;
pub mod stages;
pub mod storage;
pub mod table;

pub use orchestrator::{Pipeline, PipelineOutput};
pub use registry::StageRegistry;
pub use stage::{PipelineStage, SourceTables, StageContext, StageInputs, StageMetrics, StageOutput};
pub use table::{Row, Table};
