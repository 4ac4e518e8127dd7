//! Read-modify-write access to the sync file.
//!
//! The sync file holds fields that different parts of the application update
//! independently: annotations, reading progress and document metadata. Each
//! writer here reads the whole file, replaces only its own keys and writes
//! the whole file back, all while holding the target's queue lock, so two
//! writers in this process never drop each other's fields. Everything else
//! in the file, including entries this build cannot interpret, is written
//! back as read. Writers in other processes are not coordinated with; the
//! last write wins.

use marginalia_core::{
    Annotation, DOCUMENT_ID_KEY, DocumentId, DocumentMetadata, SyncFileDocument, SyncFileObject,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::{ResourceError, SyncCapabilityManager, SyncError, SyncTarget};

pub struct SyncDataMerger<'a> {
    sync: &'a SyncCapabilityManager,
}

impl<'a> SyncDataMerger<'a> {
    pub fn new(sync: &'a SyncCapabilityManager) -> Self {
        Self { sync }
    }

    /// The current sync document. Never fails: with no bound file, or on
    /// any read error, the empty document is returned.
    pub async fn read_document(&self) -> SyncFileDocument {
        let Some(target) = self.sync.target() else {
            return SyncFileDocument::default();
        };
        let _queue = target.acquire().await;
        match read_current(&target).await {
            Ok(file) => file.document(),
            Err(err) => {
                warn!(file = target.display_name(), error = %err, "could not read sync file");
                SyncFileDocument::default()
            }
        }
    }

    pub async fn write_annotations(&self, annotations: &[Annotation]) -> Result<(), SyncError> {
        self.update("annotations", |file| file.set_annotations(annotations))
            .await
    }

    pub async fn write_progress(
        &self,
        furthest_page: Option<u32>,
        last_page_read: Option<u32>,
    ) -> Result<(), SyncError> {
        self.update("progress", |file| {
            file.set_progress(furthest_page, last_page_read);
            Ok(())
        })
        .await
    }

    pub async fn write_metadata(&self, metadata: Option<DocumentMetadata>) -> Result<(), SyncError> {
        self.update("metadata", |file| file.set_metadata(metadata.as_ref()))
            .await
    }

    /// Record which document the file mirrors.
    pub async fn write_document_id(&self, doc: &DocumentId) -> Result<(), SyncError> {
        self.update(DOCUMENT_ID_KEY, |file| {
            file.set_extra(DOCUMENT_ID_KEY, Value::from(doc.as_str()));
            Ok(())
        })
        .await
    }

    async fn update<F>(&self, field: &'static str, apply: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut SyncFileObject) -> Result<(), serde_json::Error>,
    {
        let target = self.sync.target().ok_or(SyncError::NoSyncTarget)?;
        let _queue = target.acquire().await;

        let mut file = read_current(&target).await?;
        apply(&mut file)?;
        let bytes = file.to_json_bytes()?;

        let mut session = target.resource().create_writable().await?;
        session.write(&bytes).await?;
        session.close().await?;
        info!(file = target.display_name(), field, bytes = bytes.len(), "sync file updated");
        Ok(())
    }
}

/// Read and parse the file. A missing file reads as empty; any other read
/// failure is an error so that a writer never overwrites content it could
/// not see.
async fn read_current(target: &SyncTarget) -> Result<SyncFileObject, ResourceError> {
    match target.resource().read().await {
        Ok(bytes) => Ok(SyncFileObject::parse(&bytes)),
        Err(ResourceError::NotFound(_)) => Ok(SyncFileObject::default()),
        Err(err) => Err(err),
    }
}
