//! Collaborator traits for the external file and the host that grants access
//! to it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceError;

/// Opaque, persistable reference to one external file.
///
/// Only the [`CapabilityHost`] that issued a handle can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityHandle(String);

impl CapabilityHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access granted by the user: a handle plus a name to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub handle: CapabilityHandle,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub last_modified: DateTime<Utc>,
}

/// An open write to a [`FileResource`]. Bytes become visible to readers
/// only once the session is closed, and replace the whole file.
#[async_trait]
pub trait WritableSession: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ResourceError>;

    async fn close(self: Box<Self>) -> Result<(), ResourceError>;
}

/// A readable, writable external file.
#[async_trait]
pub trait FileResource: Send + Sync {
    async fn read(&self) -> Result<Vec<u8>, ResourceError>;

    async fn create_writable(&self) -> Result<Box<dyn WritableSession>, ResourceError>;

    async fn metadata(&self) -> Result<ResourceMetadata, ResourceError>;
}

/// The environment's file-access API.
#[async_trait]
pub trait CapabilityHost: Send + Sync {
    /// Whether this environment can grant file access at all.
    fn is_supported(&self) -> bool;

    /// Resolve a previously issued handle. Performs no I/O on the file
    /// itself; a revoked handle surfaces on first use.
    async fn open(&self, handle: &CapabilityHandle) -> Result<Arc<dyn FileResource>, ResourceError>;

    /// Let the user pick an existing file. Fails with
    /// [`ResourceError::Cancelled`] if the user aborts.
    async fn pick_existing(&self) -> Result<Grant, ResourceError>;

    /// Let the user choose where to create a new file, suggesting
    /// `suggested_name`. The new file is empty.
    async fn create_new(&self, suggested_name: &str) -> Result<Grant, ResourceError>;
}
