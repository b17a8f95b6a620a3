//! Error types for each pipeline stage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("no valid data rows after processing timestamps ({dropped} rows dropped)")]
    NoValidTimestamps { dropped: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no event records to aggregate")]
    EmptyInput,
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient history: need at least 2 distinct timestamps, got {distinct}")]
    InsufficientData { distinct: usize },

    #[error("model fit did not converge after {iterations} iterations (last change {change:.3e})")]
    FitConvergence { iterations: usize, change: f64 },

    #[error("model fit produced a singular system")]
    SingularSystem,
}

/// Terminal failure of one pipeline invocation, tagged with the stage that raised it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("forecast failed: {0}")]
    Forecast(#[from] ForecastError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Aggregation(_) => "aggregation",
            PipelineError::Forecast(_) => "forecast",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
