//! Error types and handling for the weather pipeline

use thiserror::Error;

/// Main error type for the `weatherwise` crate
#[derive(Error, Debug)]
pub enum WeatherwiseError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport failures: connect errors, timeouts, aborted bodies
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream service answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response or file content could not be interpreted
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Not enough rows/windows to proceed with a stage
    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    /// A model could not be fitted to the data
    #[error("Model fit failed: {message}")]
    ModelFit { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Tabular file errors
    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },
}

impl WeatherwiseError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new insufficient-data error
    pub fn insufficient<S: Into<String>>(message: S) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    /// Create a new model fit error
    pub fn model_fit<S: Into<String>>(message: S) -> Self {
        Self::ModelFit {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { .. } => {
                "Configuration error. Please check your config file and environment.".to_string()
            }
            Self::Network { .. } | Self::Http { .. } => {
                "Unable to reach the weather services. Please check your internet connection."
                    .to_string()
            }
            Self::Parse { .. } => "Received data in an unexpected format.".to_string(),
            Self::InsufficientData { message } | Self::ModelFit { message } => message.clone(),
            Self::Validation { message } => format!("Invalid input: {message}"),
            Self::Io { .. } | Self::Csv { .. } => {
                "File operation failed. Please check the data file and its permissions.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for WeatherwiseError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::parse(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, WeatherwiseError>;
