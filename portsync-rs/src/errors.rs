//! Error types for portsync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortSyncError {
    #[error("No valid ports outside the ephemeral range: {0}")]
    NoValidPorts(String),

    #[error("Port allocation failed: {0}")]
    Exhausted(String),

    #[error("Sync directory error: {0}")]
    SyncDir(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortSyncError>;
