use thiserror::Error;

/// Top-level error type for the companion bot.
#[derive(Debug, Error)]
pub enum CompanionError {
    /// Error from an AI provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// File store error.
    #[error("store error: {0}")]
    Store(String),

    /// License service error.
    #[error("license error: {0}")]
    License(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
