use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Product fetch failed: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Product fetch from {endpoint} returned HTTP {status}")]
    FetchStatus { endpoint: String, status: u16 },

    #[error("Persistence failed: {message}")]
    PersistenceError { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

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

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Shutdown requested during {phase}, nothing was persisted")]
    Cancelled { phase: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Persistence,
    Configuration,
    Processing,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::FetchError(_) | EtlError::FetchStatus { .. } => ErrorCategory::Network,
            EtlError::PersistenceError { .. }
            | EtlError::CsvError(_)
            | EtlError::IoError(_)
            | EtlError::SerializationError(_) => ErrorCategory::Persistence,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::ProcessingError { .. } => ErrorCategory::Processing,
            EtlError::Cancelled { .. } => ErrorCategory::Interrupted,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // upstream may recover on its own, a rerun is worth it
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Persistence => ErrorSeverity::High,
            ErrorCategory::Processing => ErrorSeverity::Critical,
            ErrorCategory::Interrupted => ErrorSeverity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::FetchError(_) => {
                "Check network connectivity and that the product API is reachable".to_string()
            }
            EtlError::FetchStatus { status, .. } if *status >= 500 => {
                "The product API is failing, retry later".to_string()
            }
            EtlError::FetchStatus { .. } => {
                "Verify the api endpoint and any required request headers".to_string()
            }
            EtlError::PersistenceError { .. } | EtlError::IoError(_) => {
                "Make sure the output path exists and is writable".to_string()
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Inspect the fetched products for unexpected values".to_string()
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => {
                "Fix the configuration value and run again (see --help)".to_string()
            }
            EtlError::ProcessingError { .. } => {
                "This is a bug in the transform stage, please report it with logs".to_string()
            }
            EtlError::Cancelled { .. } => {
                "Run again when the product API responds in time, or set --timeout-seconds"
                    .to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not fetch products: {}", self),
            ErrorCategory::Persistence => format!("Could not save products: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Processing => format!("Processing failed: {}", self),
            ErrorCategory::Interrupted => format!("Interrupted: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
