use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid config structure: {0}")]
    ConfigInvalid(String),

    #[error("No supported environment detected")]
    NoBackend,

    #[error("Plugin load error: {0}")]
    PluginLoad(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{plugin}::{handler}: {message}")]
    Handler {
        plugin: String,
        handler: String,
        message: String,
    },

    #[error("{plugin}::{handler}: Command timed out")]
    HandlerTimeout { plugin: String, handler: String },
}

pub type Result<T> = std::result::Result<T, Error>;
