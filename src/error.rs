use arrow_schema::ArrowError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    /// Input could not be loaded. Fatal for the session, there is no partial load.
    #[error("Data Load Error: {0}")]
    DataLoad(String),
    /// Programming error in how the engine is driven.
    #[error("Invariant Violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
