/// Result alias that carries the custom [`VibrationError`] type.
pub type Result<T> = std::result::Result<T, VibrationError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VibrationError {
    /// Not enough history has been buffered yet. Callers should retry on a
    /// later cycle.
    #[error("insufficient data: {available} samples buffered, {required} required")]
    InsufficientData { required: usize, available: usize },
    /// A configuration value is outside of its accepted domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The recorder holds no rows.
    #[error("no recorded data to export")]
    NothingToExport,
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl VibrationError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for the recoverable "not enough history yet" condition.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

impl From<&str> for VibrationError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VibrationError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
