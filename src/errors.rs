// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoconvertError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A flag template references a placeholder that has no value.
    #[error("Missing value for placeholder {token} in command for '{program}'")]
    MissingPlaceholderBinding { program: String, token: String },

    /// Destination folder already exists and overwriting is disabled.
    #[error("Output folder already exists: {}", .0.display())]
    OutputFolderConflict(PathBuf),

    #[error("Input folder is not a directory: {}", .0.display())]
    InputNotADirectory(PathBuf),

    /// The queue's control loop is gone (stopped or shut down).
    #[error("Process queue '{0}' is no longer running")]
    QueueClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AutoconvertError>;
