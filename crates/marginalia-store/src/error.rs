use thiserror::Error;

/// A failed read or enumeration against a key-value backend.
///
/// Writes report [`WriteError`](marginalia_core::WriteError) instead, which
/// callers treat as "persistence is stale" rather than as a read failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored value under {key} is not UTF-8")]
    NotUtf8 { key: String },
}
