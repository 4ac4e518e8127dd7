//! The local cache: the authoritative copy of every record, keyed by
//! document and record kind.
//!
//! Key layout inside the backing [`KeyValueStore`]:
//!
//! ```text
//! marginalia/doc/<document-id>/<kind>        versioned record
//! marginalia/doc/<document-id>/annotations   annotation array
//! marginalia/global/<kind>                   application-wide record
//! ```

use std::sync::Arc;

use marginalia_core::{
    AnnotationSet, DocumentId, Record, RecordKind, RecordPayload, WriteError,
    annotations_from_values, annotations_to_values,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::{Codec, KeyValueStore};

const NAMESPACE: &str = "marginalia";
const ANNOTATIONS_KEY: &str = "annotations";

/// Reads never fail: any backend error or undecodable record is logged and
/// replaced by the kind's default. Writes return [`WriteError`], which
/// callers treat as non-fatal.
#[derive(Clone)]
pub struct LocalCacheStore {
    backend: Arc<dyn KeyValueStore>,
    codec: Codec,
}

impl LocalCacheStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_codec(backend, Codec::default())
    }

    pub fn with_codec(backend: Arc<dyn KeyValueStore>, codec: Codec) -> Self {
        Self { backend, codec }
    }

    // ── Versioned records ──

    pub async fn get(&self, doc: &DocumentId, kind: RecordKind) -> RecordPayload {
        self.read_record(&record_key(doc, kind), kind).await
    }

    pub async fn put(&self, doc: &DocumentId, payload: &RecordPayload) -> Result<(), WriteError> {
        self.write_record(&record_key(doc, payload.kind()), payload).await
    }

    pub async fn remove(&self, doc: &DocumentId, kind: RecordKind) -> Result<(), WriteError> {
        self.backend.remove(&record_key(doc, kind)).await
    }

    pub async fn get_global(&self, kind: RecordKind) -> RecordPayload {
        self.read_record(&global_key(kind), kind).await
    }

    pub async fn put_global(&self, payload: &RecordPayload) -> Result<(), WriteError> {
        self.write_record(&global_key(payload.kind()), payload).await
    }

    /// Typed form of [`get`](Self::get).
    pub async fn record<R: Record>(&self, doc: &DocumentId) -> R {
        R::from_payload(self.get(doc, R::KIND).await).unwrap_or_default()
    }

    pub async fn put_record<R: Record>(&self, doc: &DocumentId, record: R) -> Result<(), WriteError> {
        self.put(doc, &record.into()).await
    }

    /// Typed form of [`get_global`](Self::get_global).
    pub async fn global_record<R: Record>(&self) -> R {
        R::from_payload(self.get_global(R::KIND).await).unwrap_or_default()
    }

    pub async fn put_global_record<R: Record>(&self, record: R) -> Result<(), WriteError> {
        self.put_global(&record.into()).await
    }

    // ── Annotations ──

    /// Annotations of `doc`. Unreadable data yields an empty set; entries
    /// that do not parse are skipped one by one.
    pub async fn annotations(&self, doc: &DocumentId) -> AnnotationSet {
        let items = self.stored_annotation_values(doc).await;
        AnnotationSet::from_vec(annotations_from_values(items, "local cache"))
    }

    /// Store `annotations`, keeping stored entries this build cannot parse.
    pub async fn put_annotations(
        &self,
        doc: &DocumentId,
        annotations: &AnnotationSet,
    ) -> Result<(), WriteError> {
        let previous = self.stored_annotation_values(doc).await;
        let values = annotations_to_values(annotations.as_slice(), previous)?;
        let raw = serde_json::to_string(&values)?;
        self.backend.put(&annotations_key(doc), &raw).await
    }

    async fn stored_annotation_values(&self, doc: &DocumentId) -> Vec<Value> {
        let Some(raw) = self.read_raw(&annotations_key(doc)).await else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!(document = %doc, "stored annotations are not an array, using empty set");
                Vec::new()
            }
            Err(err) => {
                warn!(document = %doc, error = %err, "stored annotations unreadable, using empty set");
                Vec::new()
            }
        }
    }

    // ── Documents ──

    /// Every document with at least one stored entry, in id order.
    pub async fn documents(&self) -> Vec<DocumentId> {
        let prefix = document_prefix();
        let keys = match self.backend.keys_with_prefix(&prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "could not enumerate cached documents");
                return Vec::new();
            }
        };
        let mut docs: Vec<DocumentId> = keys
            .iter()
            .filter_map(|key| key[prefix.len()..].split('/').next())
            .filter_map(|id| DocumentId::new(id).ok())
            .collect();
        docs.sort();
        docs.dedup();
        docs
    }

    /// Remove every entry stored for `doc`. Returns the number removed.
    pub async fn forget_document(&self, doc: &DocumentId) -> Result<usize, WriteError> {
        let keys = self
            .backend
            .keys_with_prefix(&format!("{}{doc}/", document_prefix()))
            .await
            .map_err(|e| WriteError::Unavailable(e.to_string()))?;
        for key in &keys {
            self.backend.remove(key).await?;
        }
        info!(document = %doc, removed = keys.len(), "forgot document");
        Ok(keys.len())
    }

    // ── Internal ──

    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    async fn read_record(&self, key: &str, kind: RecordKind) -> RecordPayload {
        let Some(raw) = self.read_raw(key).await else {
            return RecordPayload::default_for(kind);
        };
        match self.codec.decode(kind, &raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable record");
                RecordPayload::default_for(kind)
            }
        }
    }

    async fn write_record(&self, key: &str, payload: &RecordPayload) -> Result<(), WriteError> {
        let raw = self.codec.encode(payload)?;
        self.backend.put(key, &raw).await.inspect_err(|err| {
            warn!(key, error = %err, "cache write rejected");
        })
    }
}

fn document_prefix() -> String {
    format!("{NAMESPACE}/doc/")
}

fn record_key(doc: &DocumentId, kind: RecordKind) -> String {
    format!("{NAMESPACE}/doc/{doc}/{kind}")
}

fn annotations_key(doc: &DocumentId) -> String {
    format!("{NAMESPACE}/doc/{doc}/{ANNOTATIONS_KEY}")
}

fn global_key(kind: RecordKind) -> String {
    format!("{NAMESPACE}/global/{kind}")
}
