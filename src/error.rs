// File: src/error.rs
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PermuteError>;

#[derive(Debug, Error)]
pub enum PermuteError {
    #[error("kind=io: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("kind=csv: {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("kind=snapshot: {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("kind=json: {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("kind=worker_failure: {message}")]
    WorkerFailure { message: String },
    #[error("kind=incompatible_batch: {message}")]
    IncompatibleBatch { message: String },
    #[error("kind=corrupt_batch: {message}")]
    CorruptBatch { message: String },
    #[error("kind=key_collision: sound pairs {first} and {second} share storage key {key}")]
    KeyCollision {
        first: String,
        second: String,
        key: String,
    },
    #[error("kind=invalid_config: {message}")]
    InvalidConfig { message: String },
}

impl PermuteError {
    pub fn kind(&self) -> &'static str {
        match self {
            PermuteError::Io { .. } => "io",
            PermuteError::Csv { .. } => "csv",
            PermuteError::Snapshot { .. } => "snapshot",
            PermuteError::Json { .. } => "json",
            PermuteError::WorkerFailure { .. } => "worker_failure",
            PermuteError::IncompatibleBatch { .. } => "incompatible_batch",
            PermuteError::CorruptBatch { .. } => "corrupt_batch",
            PermuteError::KeyCollision { .. } => "key_collision",
            PermuteError::InvalidConfig { .. } => "invalid_config",
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PermuteError::Io { path: path.to_path_buf(), source }
    }

    pub fn csv(path: &Path, source: csv::Error) -> Self {
        PermuteError::Csv { path: path.to_path_buf(), source }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        PermuteError::InvalidConfig { message: message.into() }
    }
}
