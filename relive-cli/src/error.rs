use std::path::PathBuf;

use relive_engine::ClipError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clip error: {0}")]
    Clip(#[from] ClipError),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config file not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Interrupted before the clip was taken")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, AppError>;
