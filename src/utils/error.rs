use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid input at {location}: {reason}")]
    InvalidInput { location: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Export error: {message}")]
    ExportError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Configuration,
    Io,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SplitError {
    /// 單筆資料錯誤：指出是哪位醫師、哪個服務類別
    pub fn invalid_entry(physician: &str, category: &str, reason: impl Into<String>) -> Self {
        SplitError::InvalidInput {
            location: format!("physician '{}', category '{}'", physician, category),
            reason: reason.into(),
        }
    }

    pub fn invalid_column(column: &str, reason: impl Into<String>) -> Self {
        SplitError::InvalidInput {
            location: format!("column '{}'", column),
            reason: reason.into(),
        }
    }

    pub fn invalid_physician(physician: &str, reason: impl Into<String>) -> Self {
        SplitError::InvalidInput {
            location: format!("physician '{}'", physician),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SplitError::InvalidInput { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SplitError::InvalidInput { .. } | SplitError::CsvError(_) => ErrorCategory::Input,
            SplitError::ConfigError { .. }
            | SplitError::InvalidConfigValueError { .. }
            | SplitError::MissingConfigError { .. }
            | SplitError::TomlError(_) => ErrorCategory::Configuration,
            SplitError::IoError(_) => ErrorCategory::Io,
            SplitError::ZipError(_)
            | SplitError::SerializationError(_)
            | SplitError::ExportError { .. } => ErrorCategory::Export,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Export => ErrorSeverity::Medium,
            ErrorCategory::Io => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            SplitError::InvalidInput { location, .. } => format!(
                "Fix the billing sheet at {} (amounts must be non-negative numbers) and run again",
                location
            ),
            SplitError::CsvError(_) => {
                "Check that the sheet is a comma-separated file with a header row".to_string()
            }
            SplitError::TomlError(_) | SplitError::ConfigError { .. } => {
                "Check the TOML configuration file syntax and section names".to_string()
            }
            SplitError::InvalidConfigValueError { field, .. } => {
                format!("Correct the value of '{}' in the configuration", field)
            }
            SplitError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration or pass it on the command line", field)
            }
            SplitError::IoError(_) => {
                "Check that the input files exist and the output directory is writable".to_string()
            }
            SplitError::ZipError(_) | SplitError::SerializationError(_) => {
                "Retry the export with output_formats = [\"csv\"]".to_string()
            }
            SplitError::ExportError { .. } => {
                "Re-run the distribution to regenerate the export tables".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("The billing data was rejected: {}", self),
            ErrorCategory::Configuration => format!("The configuration is not valid: {}", self),
            ErrorCategory::Io => format!("A file could not be read or written: {}", self),
            ErrorCategory::Export => format!("The export could not be produced: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entry_names_the_pair() {
        let err = SplitError::invalid_entry("ME1", "Consultas", "negative amount -50");
        let message = err.to_string();
        assert!(message.contains("ME1"));
        assert!(message.contains("Consultas"));
        assert!(err.is_invalid_input());
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_io_errors_are_critical() {
        let err = SplitError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("gone"));
    }
}
