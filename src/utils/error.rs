use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Failed to write chunk {}: {source}", path.display())]
    ChunkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema error: column '{column}' does not exist")]
    Schema { column: String },

    #[error("Failed to read chunk {}: {detail}", path.display())]
    ChunkRead { path: PathBuf, detail: String },

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Output,
    Schema,
    Chunk,
    Config,
    Processing,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CleanError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CleanError::SourceNotFound { .. } => ErrorCategory::Source,
            CleanError::ChunkWrite { .. } | CleanError::OutputWrite { .. } => ErrorCategory::Output,
            CleanError::Schema { .. } => ErrorCategory::Schema,
            CleanError::ChunkRead { .. } | CleanError::Csv(_) => ErrorCategory::Chunk,
            CleanError::ConfigError { .. }
            | CleanError::ConfigValidationError { .. }
            | CleanError::InvalidConfigValueError { .. }
            | CleanError::MissingConfigError { .. } => ErrorCategory::Config,
            CleanError::ProcessingError { .. } | CleanError::Serialization(_) => {
                ErrorCategory::Processing
            }
            CleanError::Io(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 單一 chunk 失敗不會中止整個 run
            ErrorCategory::Chunk => ErrorSeverity::Medium,
            ErrorCategory::Schema | ErrorCategory::Config | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::Source | ErrorCategory::Output | ErrorCategory::Io => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            CleanError::SourceNotFound { path } => {
                format!("Check that '{}' exists and is readable", path.display())
            }
            CleanError::ChunkWrite { path, .. } | CleanError::OutputWrite { path, .. } => format!(
                "Check free disk space and write permissions for '{}'",
                path.display()
            ),
            CleanError::Schema { column } => format!(
                "Make sure every input file declares the column '{}' or remove it from the configuration",
                column
            ),
            CleanError::ChunkRead { path, .. } => format!(
                "Inspect '{}' for malformed rows or non UTF-8 bytes and re-run",
                path.display()
            ),
            CleanError::Csv(_) => "Check the delimiter setting and the file's row structure".to_string(),
            CleanError::ConfigError { .. }
            | CleanError::ConfigValidationError { .. }
            | CleanError::InvalidConfigValueError { .. }
            | CleanError::MissingConfigError { .. } => {
                "Review the configuration file and command line arguments".to_string()
            }
            CleanError::Io(_) => "Check file permissions and available disk space".to_string(),
            CleanError::Serialization(_) | CleanError::ProcessingError { .. } => {
                "Re-run with --verbose and inspect the log output".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CleanError::SourceNotFound { path } => {
                format!("Input '{}' could not be found", path.display())
            }
            CleanError::ChunkWrite { path, .. } => {
                format!("Could not write chunk file '{}'", path.display())
            }
            CleanError::OutputWrite { path, .. } => {
                format!("Could not write output file '{}'", path.display())
            }
            CleanError::Schema { column } => format!("Column '{}' is missing from the data", column),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_by_category() {
        let missing = CleanError::SourceNotFound {
            path: PathBuf::from("raw.csv"),
        };
        assert_eq!(missing.category(), ErrorCategory::Source);
        assert_eq!(missing.severity(), ErrorSeverity::Critical);

        let schema = CleanError::Schema {
            column: "id".to_string(),
        };
        assert_eq!(schema.severity(), ErrorSeverity::High);
        assert!(schema.user_friendly_message().contains("'id'"));

        let chunk = CleanError::ChunkRead {
            path: PathBuf::from("chunk_1.csv"),
            detail: "bad row".to_string(),
        };
        assert_eq!(chunk.severity(), ErrorSeverity::Medium);
        assert!(chunk.recovery_suggestion().contains("chunk_1.csv"));
    }
}
