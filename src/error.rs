// Error types for devtils.
// Covers storage, serialization, settings and logging bootstrap failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevtilsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Settings write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Webhook delivery error: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, DevtilsError>;
