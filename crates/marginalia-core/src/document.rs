//! The external sync file: annotations, reading progress and metadata of one
//! document in a single JSON file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::Annotation;
use crate::annotation::{annotations_from_values, annotations_to_values};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Contents of the external sync file.
///
/// Top-level keys this build does not know are kept in `extra` and written
/// back unchanged, so newer clients sharing the file do not lose data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFileDocument {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub furthest_page: Option<u32>,
    #[serde(default)]
    pub last_page_read: Option<u32>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level key naming the document whose state the file mirrors.
pub const DOCUMENT_ID_KEY: &str = "documentId";

const KNOWN_KEYS: [&str; 4] = ["annotations", "furthestPage", "lastPageRead", "metadata"];

impl SyncFileDocument {
    /// Parse file contents written by any client version. Never fails.
    ///
    /// Accepted shapes:
    /// - a bare JSON array of annotations (oldest format)
    /// - a structured object with any subset of the known keys
    /// - empty or unparseable content, which yields the default document
    ///
    /// Individual annotations that do not parse are dropped with a warning;
    /// fields of the wrong type read as absent.
    pub fn parse(bytes: &[u8]) -> Self {
        let Some(value) = read_json(bytes) else {
            return Self::default();
        };

        match value {
            Value::Array(items) => Self {
                annotations: annotations_from_values(items, "sync file"),
                ..Self::default()
            },
            Value::Object(map) => Self::parse_object(map),
            other => {
                warn!(kind = json_kind(&other), "sync file has unexpected shape, using empty document");
                Self::default()
            }
        }
    }

    fn parse_object(mut map: Map<String, Value>) -> Self {
        let annotations = match map.remove("annotations") {
            Some(Value::Array(items)) => annotations_from_values(items, "sync file"),
            _ => Vec::new(),
        };
        let furthest_page = map.remove("furthestPage").and_then(page_number);
        let last_page_read = map.remove("lastPageRead").and_then(page_number);
        let metadata = map
            .remove("metadata")
            .and_then(|v| serde_json::from_value(v).ok());
        map.retain(|key, _| !KNOWN_KEYS.contains(&key.as_str()));
        Self {
            annotations,
            furthest_page,
            last_page_read,
            metadata,
            extra: map,
        }
    }

    /// The document this file mirrors, if a writer recorded one.
    pub fn document_id(&self) -> Option<&str> {
        self.extra.get(DOCUMENT_ID_KEY).and_then(Value::as_str)
    }

    /// Serialise as pretty-printed UTF-8 JSON.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// The sync file as an untyped top-level object, for rewriting some fields
/// and leaving the rest as found.
///
/// [`SyncFileDocument`] drops what it cannot interpret; writing it back would
/// erase annotations from newer clients or a metadata object of another
/// shape. Writers patch this object instead, so only the keys they set
/// change. A bare-array file is lifted into the structured form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncFileObject {
    map: Map<String, Value>,
}

impl SyncFileObject {
    /// Same accepted shapes as [`SyncFileDocument::parse`]. Never fails.
    pub fn parse(bytes: &[u8]) -> Self {
        let map = match read_json(bytes) {
            Some(Value::Object(map)) => map,
            Some(Value::Array(items)) => {
                let mut map = Map::new();
                map.insert("annotations".into(), Value::Array(items));
                map
            }
            Some(other) => {
                warn!(kind = json_kind(&other), "sync file has unexpected shape, using empty document");
                Map::new()
            }
            None => Map::new(),
        };
        Self { map }
    }

    /// Typed view of the current contents.
    pub fn document(&self) -> SyncFileDocument {
        SyncFileDocument::parse_object(self.map.clone())
    }

    /// Replace the annotations. Entries already in the file that this build
    /// cannot parse are kept.
    pub fn set_annotations(&mut self, annotations: &[Annotation]) -> Result<(), serde_json::Error> {
        let previous = match self.map.remove("annotations") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let values = annotations_to_values(annotations, previous)?;
        self.map.insert("annotations".into(), Value::Array(values));
        Ok(())
    }

    pub fn set_progress(&mut self, furthest_page: Option<u32>, last_page_read: Option<u32>) {
        self.map.insert("furthestPage".into(), furthest_page.into());
        self.map.insert("lastPageRead".into(), last_page_read.into());
    }

    pub fn set_metadata(&mut self, metadata: Option<&DocumentMetadata>) -> Result<(), serde_json::Error> {
        self.map
            .insert("metadata".into(), serde_json::to_value(metadata)?);
        Ok(())
    }

    /// Set a top-level key outside the known fields.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    /// Serialise as pretty-printed UTF-8 JSON. Known keys missing from the
    /// file are written as empty.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut map = self.map.clone();
        map.entry("annotations").or_insert_with(|| Value::Array(Vec::new()));
        for key in &KNOWN_KEYS[1..] {
            map.entry(*key).or_insert(Value::Null);
        }
        serde_json::to_vec_pretty(&Value::Object(map))
    }
}

fn read_json(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "sync file is not valid JSON, using empty document");
            None
        }
    }
}

fn page_number(value: Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGHLIGHT: &str = r#"{"id":"1","type":"highlight","createdAt":"2024-04-01T10:00:00Z","pageNumber":2,"text":"quoted"}"#;

    #[test]
    fn bare_array_is_annotations_only() {
        let doc = SyncFileDocument::parse(format!("[{HIGHLIGHT}]").as_bytes());
        assert_eq!(doc.annotations.len(), 1);
        assert_eq!(doc.annotations[0].id(), "1");
        assert_eq!(doc.furthest_page, None);
        assert_eq!(doc.last_page_read, None);
        assert_eq!(doc.metadata, None);
        assert!(doc.extra.is_empty());
    }

    #[test]
    fn structured_object_reads_every_field() {
        let raw = format!(
            r#"{{"annotations":[{HIGHLIGHT}],"furthestPage":12,"lastPageRead":7,
                "metadata":{{"title":"T","author":null}}}}"#
        );
        let doc = SyncFileDocument::parse(raw.as_bytes());
        assert_eq!(doc.annotations.len(), 1);
        assert_eq!(doc.furthest_page, Some(12));
        assert_eq!(doc.last_page_read, Some(7));
        assert_eq!(
            doc.metadata,
            Some(DocumentMetadata {
                title: "T".into(),
                author: None
            })
        );
    }

    #[test]
    fn empty_and_garbage_yield_default() {
        assert_eq!(SyncFileDocument::parse(b""), SyncFileDocument::default());
        assert_eq!(SyncFileDocument::parse(b"  \n"), SyncFileDocument::default());
        assert_eq!(SyncFileDocument::parse(b"{not json"), SyncFileDocument::default());
        assert_eq!(SyncFileDocument::parse(b"42"), SyncFileDocument::default());
    }

    #[test]
    fn wrongly_typed_fields_read_as_absent() {
        let raw = br#"{"annotations":"nope","furthestPage":"ten","lastPageRead":-1,"metadata":[]}"#;
        assert_eq!(SyncFileDocument::parse(raw), SyncFileDocument::default());
    }

    #[test]
    fn malformed_annotation_is_skipped() {
        let raw = format!(r#"[{HIGHLIGHT}, {{"type":"bookmark","id":"2"}}]"#);
        let doc = SyncFileDocument::parse(raw.as_bytes());
        assert_eq!(doc.annotations.len(), 1);
    }

    #[test]
    fn unknown_keys_survive_roundtrip() {
        let raw = br#"{"annotations":[],"furthestPage":null,"lastPageRead":null,"metadata":null,"tags":["a"]}"#;
        let doc = SyncFileDocument::parse(raw);
        assert_eq!(doc.extra["tags"], serde_json::json!(["a"]));

        let written: Value = serde_json::from_slice(&doc.to_json_bytes().unwrap()).unwrap();
        assert_eq!(written["tags"], serde_json::json!(["a"]));
        assert!(written["furthestPage"].is_null());
        assert!(written["metadata"].is_null());
    }

    #[test]
    fn default_serialises_all_keys_as_null() {
        let written: Value =
            serde_json::from_slice(&SyncFileDocument::default().to_json_bytes().unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "annotations": [],
                "furthestPage": null,
                "lastPageRead": null,
                "metadata": null
            })
        );
    }

    #[test]
    fn object_patch_keeps_what_the_typed_view_drops() {
        let raw = br#"{"annotations":[{"type":"underline","id":"u1"}],
            "metadata":{"title":null,"author":"A"},"furthestPage":2}"#;
        let mut file = SyncFileObject::parse(raw);
        assert!(file.document().annotations.is_empty());
        assert_eq!(file.document().metadata, None);

        file.set_progress(Some(5), None);
        let written: Value = serde_json::from_slice(&file.to_json_bytes().unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "annotations": [{"type": "underline", "id": "u1"}],
                "furthestPage": 5,
                "lastPageRead": null,
                "metadata": {"title": null, "author": "A"}
            })
        );
    }

    #[test]
    fn object_lifts_bare_array() {
        let file = SyncFileObject::parse(format!("[{HIGHLIGHT}]").as_bytes());
        let written: Value = serde_json::from_slice(&file.to_json_bytes().unwrap()).unwrap();
        assert_eq!(written["annotations"][0]["id"], "1");
        assert!(written["metadata"].is_null());
        assert_eq!(file.document().annotations.len(), 1);
    }

    #[test]
    fn document_id_reads_from_extra() {
        let doc = SyncFileDocument::parse(br#"{"documentId":"sha256-abc"}"#);
        assert_eq!(doc.document_id(), Some("sha256-abc"));
        assert_eq!(SyncFileDocument::default().document_id(), None);
    }
}
