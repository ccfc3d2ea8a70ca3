use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("No matching camera found for owner '{owner}'")]
    NoDeviceFound { owner: String },

    #[error("Failed to open camera on {port}: {reason}")]
    OpenError { port: String, reason: String },

    #[error("Camera configuration error on '{key}': {reason}")]
    ConfigError { key: String, reason: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Camera is not ready")]
    NotReady,

    #[error("Requested {requested} destination paths but {expected} pictures are recorded")]
    BatchMismatch { expected: usize, requested: usize },

    #[error("Lock poisoned by previous panic")]
    PoisonedLock,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl PhotoError {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        PhotoError::ConfigError {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn open(port: &str, reason: impl Into<String>) -> Self {
        PhotoError::OpenError {
            port: port.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable label used in command responses
    pub fn kind(&self) -> &'static str {
        match self {
            PhotoError::NoDeviceFound { .. } => "no_device_found",
            PhotoError::OpenError { .. } => "open_error",
            PhotoError::ConfigError { .. } => "config_error",
            PhotoError::IoError(_) => "io_error",
            PhotoError::NotReady => "not_ready",
            PhotoError::BatchMismatch { .. } => "batch_mismatch",
            PhotoError::PoisonedLock => "poisoned_lock",
            PhotoError::InvalidSettings(_) => "invalid_settings",
        }
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(e: std::io::Error) -> Self {
        PhotoError::IoError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PhotoError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        PhotoError::PoisonedLock
    }
}
