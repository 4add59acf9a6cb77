use thiserror::Error;

/// Domain-level errors for MinerHost.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network request blocked: {reason}")]
    NetworkBlocked { reason: String },

    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    /// Invalid or heterogeneous algorithm selection. Aborts session setup.
    #[error("Invalid mining initialization: {0}")]
    Initialization(String),

    /// The miner executable is missing or the OS refused to start it.
    #[error("Failed to launch {path}: {reason}")]
    Launch { path: String, reason: String },

    #[error("Process error: {0}")]
    Process(String),

    /// A stats poll failed. Recovered locally, never surfaced to the session.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Installation of {uuid} failed: {message}")]
    Install { uuid: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Whether this error is the result of cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<zip::result::ZipError> for DomainError {
    fn from(err: zip::result::ZipError) -> Self {
        DomainError::Archive(err.to_string())
    }
}
