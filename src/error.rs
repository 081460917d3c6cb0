use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Table '{table}' already produced by {first} (also claimed by {second})")]
    DuplicateProducer {
        table: String,
        first: String,
        second: String,
    },

    #[error("{stage} requires '{table}' but no stage produces it")]
    MissingProducer { stage: String, table: String },

    #[error("Circular dependency detected between stages: {}", .stages.join(", "))]
    DependencyCycle { stages: Vec<String> },

    #[error("{stage} produced invalid {table}: {}; sample={sample}", .violations.join("; "))]
    SchemaViolation {
        stage: String,
        table: String,
        violations: Vec<String>,
        sample: String,
    },

    #[error("{stage} cannot resolve inputs: {}", .tables.join(", "))]
    MissingInput { stage: String, tables: Vec<String> },

    #[error("{stage} attempted to overwrite existing table '{table}'")]
    TableOverwrite { stage: String, table: String },

    #[error("Stage '{stage}' failed: {source:#}")]
    StageFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for errors raised while building the stage graph, before any stage runs
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::DuplicateProducer { .. }
                | PipelineError::MissingProducer { .. }
                | PipelineError::DependencyCycle { .. }
                | PipelineError::Config(_)
        )
    }

    /// Name of the stage the error is attributed to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::MissingProducer { stage, .. }
            | PipelineError::MissingInput { stage, .. }
            | PipelineError::TableOverwrite { stage, .. }
            | PipelineError::SchemaViolation { stage, .. }
            | PipelineError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
