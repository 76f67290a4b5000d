use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmsError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned {status} for {endpoint}: {body}")]
    HttpStatus {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
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

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Tenant mismatch: expected '{expected}', found '{found}'")]
    TenantMismatch { expected: String, found: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Audit step '{step}' failed: {details}")]
    StepFailed { step: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Domain,
    Storage,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 命令以錯誤結束時的退出碼；任何嚴重程度都不回傳 0
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low | ErrorSeverity::High => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl PmsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PmsError::ApiError(_) | PmsError::HttpStatus { .. } => ErrorCategory::Network,
            PmsError::ConfigError { .. }
            | PmsError::ConfigValidationError { .. }
            | PmsError::InvalidConfigValueError { .. }
            | PmsError::MissingConfigError { .. } => ErrorCategory::Configuration,
            PmsError::CsvError(_)
            | PmsError::SerializationError(_)
            | PmsError::ProcessingError { .. }
            | PmsError::ValidationError { .. } => ErrorCategory::Data,
            PmsError::InvalidTransition { .. }
            | PmsError::TenantMismatch { .. }
            | PmsError::NotFound { .. }
            | PmsError::StepFailed { .. } => ErrorCategory::Domain,
            PmsError::ZipError(_) | PmsError::IoError(_) => ErrorCategory::Storage,
            PmsError::CacheError { .. } => ErrorCategory::Cache,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PmsError::CacheError { .. } => ErrorSeverity::Low,
            PmsError::ApiError(_) | PmsError::StepFailed { .. } => ErrorSeverity::Medium,
            PmsError::HttpStatus { status, .. } if *status >= 500 || *status == 429 => {
                ErrorSeverity::Medium
            }
            PmsError::ConfigError { .. }
            | PmsError::ConfigValidationError { .. }
            | PmsError::InvalidConfigValueError { .. }
            | PmsError::MissingConfigError { .. }
            | PmsError::TenantMismatch { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否值得重試（網路錯誤、5xx、429）
    pub fn is_retryable(&self) -> bool {
        match self {
            PmsError::ApiError(e) => !e.is_decode() && !e.is_builder(),
            PmsError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self.category() {
            ErrorCategory::Network => {
                "Check that the PMS API is reachable and the API token is valid".to_string()
            }
            ErrorCategory::Configuration => {
                "Review the configuration file and required environment variables".to_string()
            }
            ErrorCategory::Data => {
                "Inspect the API payloads for missing or malformed fields".to_string()
            }
            ErrorCategory::Domain => {
                "Resolve the reported booking/room/folio state in the PMS, then rerun the audit"
                    .to_string()
            }
            ErrorCategory::Storage => {
                "Check that the output path exists and is writable".to_string()
            }
            ErrorCategory::Cache => {
                "Check the cache backend; reads fall back to the PMS API meanwhile".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            PmsError::HttpStatus {
                status, endpoint, ..
            } => format!("PMS API rejected the request to {} ({})", endpoint, status),
            PmsError::ApiError(_) => "Could not reach the PMS API".to_string(),
            PmsError::StepFailed { step, .. } => {
                format!("Night audit stopped at step '{}'", step)
            }
            PmsError::InvalidTransition { entity, from, to } => {
                format!("A {} cannot move from '{}' to '{}'", entity, from, to)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PmsError>;
