use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("No metrics selected")]
    EmptySelection,

    #[error("Invalid year range: {start} > {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    #[error("Boundary data unavailable: {0}")]
    BoundaryUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
