use thiserror::Error;

use crate::RecordKind;

/// Why a stored record could not be decoded.
///
/// Both variants are recovered locally by substituting the kind's default
/// payload; they are never shown to the end user.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("stored {kind} record is not valid JSON: {source}")]
    CorruptData {
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored {kind} record has version {found}, newest supported is {current}")]
    UnsupportedVersion {
        kind: RecordKind,
        found: u64,
        current: u32,
    },
}

/// A rejected write to a durable store.
///
/// Recoverable: in-memory state stays correct, persistence is merely stale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded => {
                Self::QuotaExceeded
            }
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unavailable(format!("serialisation failed: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid document id: {0:?}")]
pub struct InvalidDocumentId(pub String);
