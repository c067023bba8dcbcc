use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] pypr_core::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
