use marginalia_core::WriteError;
use thiserror::Error;

/// Failure of an operation on the external file or its host.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("the user cancelled the file selection")]
    Cancelled,

    #[error("file access is not supported in this environment")]
    Unsupported,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    /// Map an io error on `path`, keeping the distinctions callers act on.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(path.display().to_string())
            }
            _ => Self::Io(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// No sync file is bound. Callers treat this as a no-op.
    #[error("no sync file configured")]
    NoSyncTarget,

    /// The user aborted a file selection. A normal outcome, not a failure.
    #[error("file selection cancelled")]
    Cancelled,

    #[error("sync files are not supported in this environment")]
    Unsupported,

    #[error("sync file error: {0}")]
    Resource(ResourceError),

    #[error("could not persist sync settings: {0}")]
    Write(#[from] WriteError),

    #[error("could not serialise sync document: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ResourceError> for SyncError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Cancelled => Self::Cancelled,
            ResourceError::Unsupported => Self::Unsupported,
            other => Self::Resource(other),
        }
    }
}
