//! Error handling module for the probe engine
//!
//! Probe failures are not errors here; they become sentinel results (see
//! `domain::errors`). These variants cover startup and input problems.

use thiserror::Error;

/// Main error type for engine setup and CLI operations
#[derive(Error, Debug)]
pub enum ProbeEngineError {
    /// Invalid or inconsistent configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Config file could not be parsed
    #[error("Failed to parse config file {path}: {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Playlist input error
    #[error("Playlist error: {message}")]
    Playlist { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProbeEngineError {
    pub fn config(message: impl Into<String>) -> Self {
        ProbeEngineError::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, ProbeEngineError>;
