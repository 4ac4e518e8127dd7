//! Core types for Marginalia: annotations, versioned record payloads, the
//! external sync document and the shared error taxonomy.

pub mod annotation;
pub mod document;
pub mod error;
pub mod id;
pub mod metadata;
pub mod record;
pub mod timestamp;

pub use annotation::{
    AddOutcome, Annotation, AnnotationSet, Bookmark, Highlight, Note, Rect, annotations_from_values,
    annotations_to_values,
};
pub use document::{DOCUMENT_ID_KEY, DocumentMetadata, SyncFileDocument, SyncFileObject};
pub use error::{CodecError, InvalidDocumentId, WriteError};
pub use id::IdGenerator;
pub use metadata::metadata_from_filename;
pub use record::{
    ChatMessage, ChatMessages, ChatRole, DocumentId, GlobalUiState, Record, RecordKind,
    RecordPayload, Theme, ViewerUiState,
};
