//! Wiring of the persistence layer behind the CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use marginalia_core::{AnnotationSet, DocumentId, IdGenerator, ViewerUiState};
use marginalia_store::{FileStore, LocalCacheStore};
use marginalia_sync::{
    KvCapabilityStore, LocalFileHost, SyncCapabilityManager, SyncDataMerger, SyncError,
};
use tracing::{debug, warn};

pub struct Session {
    pub cache: LocalCacheStore,
    pub sync: SyncCapabilityManager,
    pub ids: IdGenerator,
}

impl Session {
    /// Open the data directory and restore the sync binding, revalidating it.
    pub async fn open(data_dir: &Path, host: LocalFileHost) -> anyhow::Result<Self> {
        let store = Arc::new(
            FileStore::open(data_dir)
                .await
                .with_context(|| format!("opening data directory {}", data_dir.display()))?,
        );
        let cache = LocalCacheStore::new(store.clone());
        let mut sync = SyncCapabilityManager::new(
            Arc::new(host),
            Arc::new(KvCapabilityStore::new(store.clone())),
            store,
        );
        let state = sync.initialize().await;
        debug!(?state, "sync capability restored");
        Ok(Self {
            cache,
            sync,
            ids: IdGenerator::new(),
        })
    }

    pub fn merger(&self) -> SyncDataMerger<'_> {
        SyncDataMerger::new(&self.sync)
    }

    /// Check that the bound sync file mirrors `doc`. A file naming no
    /// document yet is claimed for `doc`; a file naming another document is
    /// left alone and `false` returned.
    pub async fn claim_sync_file(&self, doc: &DocumentId) -> Result<bool, SyncError> {
        if !self.sync.is_bound() {
            return Err(SyncError::NoSyncTarget);
        }
        let merger = self.merger();
        let remote = merger.read_document().await;
        match remote.document_id() {
            Some(owner) if owner == doc.as_str() => Ok(true),
            Some(owner) => {
                warn!(document = %doc, owner, "sync file mirrors another document");
                eprintln!("warning: sync file belongs to document {owner}, not {doc}");
                Ok(false)
            }
            None => {
                merger.write_document_id(doc).await?;
                Ok(true)
            }
        }
    }

    /// Store `annotations` locally, then mirror them to the sync file.
    pub async fn save_annotations(
        &self,
        doc: &DocumentId,
        annotations: &AnnotationSet,
    ) -> anyhow::Result<()> {
        self.cache
            .put_annotations(doc, annotations)
            .await
            .context("saving annotations")?;
        let mirrored = match self.claim_sync_file(doc).await {
            Ok(true) => {
                self.merger()
                    .write_annotations(annotations.as_slice())
                    .await
            }
            Ok(false) => Ok(()),
            Err(err) => Err(err),
        };
        report_mirror(mirrored);
        Ok(())
    }

    /// Store the viewer state locally, then mirror reading progress to the
    /// sync file.
    pub async fn save_viewer(&self, doc: &DocumentId, viewer: ViewerUiState) -> anyhow::Result<()> {
        let furthest = viewer.furthest_page;
        let current = viewer.current_page;
        self.cache
            .put_record(doc, viewer)
            .await
            .context("saving viewer state")?;
        let mirrored = match self.claim_sync_file(doc).await {
            Ok(true) => {
                self.merger()
                    .write_progress(Some(furthest), Some(current))
                    .await
            }
            Ok(false) => Ok(()),
            Err(err) => Err(err),
        };
        report_mirror(mirrored);
        Ok(())
    }
}

/// Mirroring is best effort: the local cache already holds the data.
fn report_mirror(result: Result<(), SyncError>) {
    match result {
        Ok(()) => {}
        Err(SyncError::NoSyncTarget) => debug!("no sync file bound, skipping mirror"),
        Err(err) => {
            warn!(error = %err, "could not update sync file");
            eprintln!("warning: sync file not updated: {err}");
        }
    }
}
