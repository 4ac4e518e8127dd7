//! Sync layer: the user-chosen external file that mirrors a document's
//! annotations, reading progress and metadata across devices.
//!
//! [`SyncCapabilityManager`] owns the grant to that file and survives
//! restarts; [`SyncDataMerger`] reads and rewrites it field by field;
//! [`reconcile`] folds its contents back into local state.

mod error;
pub use error::{ResourceError, SyncError};

pub mod capability;
pub mod local;
pub mod merger;
pub mod reconcile;
pub mod resource;

#[cfg(test)]
mod testing;

pub use capability::{
    CapabilityStore, KvCapabilityStore, SyncCapabilityManager, SyncState, SyncTarget,
};
pub use local::{LocalFile, LocalFileHost};
pub use merger::SyncDataMerger;
pub use reconcile::{Reconciled, reconcile};
pub use resource::{
    CapabilityHandle, CapabilityHost, FileResource, Grant, ResourceMetadata, WritableSession,
};
