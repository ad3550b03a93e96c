//! Error kinds the stages need to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context attached.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The engine executable could not be started at all.
    #[error("failed to spawn {}: {source}", .executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited zero but its declared result file cannot be read.
    #[error("result file {} unreadable: {source}", .path.display())]
    ResultMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document declares no stats output.
    #[error("{} declares no result file", .config.display())]
    NoResultPath { config: PathBuf },

    #[error("{} is not a valid document: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sweep: {0}")]
    InvalidSweep(String),
}

impl BenchError {
    /// Fatal errors abort the whole stage; the rest only affect one configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BenchError::Spawn { .. } | BenchError::InvalidSweep(_))
    }
}
