pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;

pub use config::{FixesConfig, Settings};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOutput, SourceTables, StageRegistry, Table};
