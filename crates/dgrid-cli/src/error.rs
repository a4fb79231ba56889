use std::path::PathBuf;

use dgrid_layout::{ConfigError, LayoutError, SnapshotError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("layout has {errors} error(s)")]
    InvalidLayout { errors: usize },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl CliError {
    /// Process exit status for this error.
    ///
    /// `2` means the input parsed but the layout is invalid; `3` means the
    /// input could not be read as a snapshot or config at all.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidLayout { .. } => 2,
            Self::Json(_)
            | Self::Snapshot(SnapshotError::Parse { .. })
            | Self::Snapshot(SnapshotError::UnsupportedVersion { .. })
            | Self::Snapshot(SnapshotError::NoMigrationPath { .. }) => 3,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
