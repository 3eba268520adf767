//! Error types shared by every pipeline stage.

use thiserror::Error;

/// Failure of a single country's load or clean, or of an output write.
///
/// Per-country variants are isolated by the caller: a multi-country run logs
/// them and carries on with the countries that succeeded.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unknown country code: {0}")]
    UnknownCountry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Short machine-friendly label, used in skip notices and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ParseError(_) => "parse_error",
            Self::SchemaMismatch(_) => "schema_mismatch",
            Self::UnknownCountry(_) => "unknown_country",
            Self::Io(_) => "io_error",
            Self::Csv(_) => "csv_error",
            Self::Http(_) => "http_error",
            Self::Serde(_) => "serde_error",
            Self::Task(_) => "task_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
