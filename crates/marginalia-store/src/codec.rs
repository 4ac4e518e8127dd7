//! Encoding and decoding of versioned records.
//!
//! A stored record is a JSON object carrying an integer `version` beside its
//! payload fields. Anything else (a bare array, an object without a usable
//! `version`) predates versioning and is read as version 0.
//!
//! Decoding never interprets a record newer than this build understands:
//! such records fail with [`CodecError::UnsupportedVersion`] and callers
//! fall back to the default payload.

use marginalia_core::{CodecError, RecordKind, RecordPayload};
use serde_json::Value;
use tracing::warn;

use crate::MigrationRegistry;

const VERSION_FIELD: &str = "version";

/// A parsed but not yet interpreted record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// Object with an integer `version`; `body` holds the remaining fields.
    Versioned { version: u64, body: Value },
    /// Unversioned data written before records were tagged.
    Legacy(Value),
}

impl RawRecord {
    pub fn parse(kind: RecordKind, raw: &str) -> Result<Self, CodecError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|source| CodecError::CorruptData { kind, source })?;
        Ok(Self::classify(value))
    }

    fn classify(value: Value) -> Self {
        match value {
            Value::Object(mut map) => match map.get(VERSION_FIELD).and_then(Value::as_u64) {
                Some(version) => {
                    map.remove(VERSION_FIELD);
                    Self::Versioned {
                        version,
                        body: Value::Object(map),
                    }
                }
                None => Self::Legacy(Value::Object(map)),
            },
            other => Self::Legacy(other),
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::Versioned { version, .. } => *version,
            Self::Legacy(_) => 0,
        }
    }

    fn into_body(self) -> Value {
        match self {
            Self::Versioned { body, .. } => body,
            Self::Legacy(body) => body,
        }
    }
}

/// Decodes stored records into current-version payloads, migrating older
/// ones on the way, and encodes payloads stamped with the current version.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: MigrationRegistry,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(MigrationRegistry::standard())
    }
}

impl Codec {
    pub fn new(registry: MigrationRegistry) -> Self {
        Self { registry }
    }

    /// Decode `raw` as a record of `kind`.
    ///
    /// Errors only for unparseable input and for versions newer than
    /// current. A record that migrates badly or fails shape validation
    /// decodes to the kind's default, with a warning.
    pub fn decode(&self, kind: RecordKind, raw: &str) -> Result<RecordPayload, CodecError> {
        let record = RawRecord::parse(kind, raw)?;
        let current = kind.current_version();
        let found = record.version();
        if found > u64::from(current) {
            return Err(CodecError::UnsupportedVersion {
                kind,
                found,
                current,
            });
        }

        let mut version = found as u32;
        let mut body = record.into_body();
        while version < current {
            let (next, migrated) = self.registry.migrate(kind, version, body);
            match migrated {
                Some(migrated) => body = migrated,
                None => {
                    warn!(%kind, from = version, "migration step rejected record, using default");
                    return Ok(RecordPayload::default_for(kind));
                }
            }
            version = next;
        }

        match RecordPayload::from_body(kind, body) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                warn!(%kind, version = found, error = %err, "record failed shape validation, using default");
                Ok(RecordPayload::default_for(kind))
            }
        }
    }

    /// Encode `payload`, stamped with its kind's current version.
    pub fn encode(&self, payload: &RecordPayload) -> Result<String, serde_json::Error> {
        let version = payload.kind().current_version();
        let mut record = match payload.to_body()? {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        record.insert(VERSION_FIELD.into(), Value::from(version));
        serde_json::to_string(&Value::Object(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::{
        ChatMessage, ChatMessages, ChatRole, GlobalUiState, Theme, ViewerUiState, timestamp,
    };
    use serde_json::json;

    fn codec() -> Codec {
        Codec::default()
    }

    fn chat(payload: RecordPayload) -> ChatMessages {
        match payload {
            RecordPayload::ChatMessages(chat) => chat,
            other => panic!("expected chat messages, got {other:?}"),
        }
    }

    /// One fixture per (kind, version) pair, oldest first.
    fn fixtures() -> Vec<(RecordKind, &'static str)> {
        vec![
            (
                RecordKind::ChatMessages,
                r#"[{"id":1,"text":"hello","isUser":true,"timestamp":1700000000000}]"#,
            ),
            (
                RecordKind::ChatMessages,
                r#"{"messages":[{"id":"1","text":"hello","isUser":false}]}"#,
            ),
            (
                RecordKind::ChatMessages,
                r#"{"version":1,"messages":[{"id":"1","role":"user","content":"hello","createdAt":"2024-01-01T00:00:00Z"}]}"#,
            ),
            (
                RecordKind::ViewerUiState,
                r#"{"page":3,"scale":1.5,"sidebarOpen":false}"#,
            ),
            (
                RecordKind::ViewerUiState,
                r#"{"version":1,"currentPage":3,"zoom":1.5,"sidebarOpen":true}"#,
            ),
            (
                RecordKind::ViewerUiState,
                r#"{"version":2,"currentPage":3,"zoom":1.5,"sidebarOpen":true,"sidebarWidth":280,"furthestPage":9}"#,
            ),
            (
                RecordKind::GlobalUiState,
                r#"{"darkMode":true,"chatPanelWidth":420}"#,
            ),
            (
                RecordKind::GlobalUiState,
                r#"{"version":1,"darkMode":false,"chatPanelWidth":420}"#,
            ),
            (
                RecordKind::GlobalUiState,
                r#"{"version":2,"theme":"dark","chatPanelWidth":420,"showPageNumbers":false}"#,
            ),
        ]
    }

    #[test]
    fn reencoding_is_idempotent_for_every_version() {
        let codec = codec();
        for (kind, raw) in fixtures() {
            let decoded = codec.decode(kind, raw).unwrap();
            assert_ne!(decoded, RecordPayload::default_for(kind), "fixture fell back to default: {raw}");
            let reencoded = codec.encode(&decoded).unwrap();
            assert_eq!(codec.decode(kind, &reencoded).unwrap(), decoded, "fixture: {raw}");
        }
    }

    #[test]
    fn current_chat_messages_pass_through_unchanged() {
        let raw = r#"{"version":1,"messages":[{"id":"1","role":"user","content":"Summarise page 2","createdAt":"2024-03-05T08:00:00Z"}]}"#;
        let messages = chat(codec().decode(RecordKind::ChatMessages, raw).unwrap()).messages;
        assert_eq!(
            messages,
            vec![ChatMessage {
                id: "1".into(),
                role: ChatRole::User,
                content: "Summarise page 2".into(),
                created_at: "2024-03-05T08:00:00Z".parse().unwrap(),
            }]
        );
    }

    #[test]
    fn future_version_is_unsupported() {
        let raw = r#"{"version":999,"messages":[{"id":"1","role":"user","content":"x","createdAt":"2024-01-01T00:00:00Z"}]}"#;
        let err = codec().decode(RecordKind::ChatMessages, raw).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedVersion {
                found: 999,
                current: 1,
                ..
            }
        ));
    }

    #[test]
    fn unparseable_is_corrupt() {
        let err = codec().decode(RecordKind::ViewerUiState, "{\"version\":2,").unwrap_err();
        assert!(matches!(err, CodecError::CorruptData { .. }));
    }

    #[test]
    fn shape_failure_yields_default() {
        let raw = r#"{"version":2,"currentPage":"three","zoom":1.0,"sidebarOpen":true,"sidebarWidth":1,"furthestPage":1}"#;
        assert_eq!(
            codec().decode(RecordKind::ViewerUiState, raw).unwrap(),
            RecordPayload::ViewerUiState(ViewerUiState::default())
        );
    }

    #[test]
    fn rejected_migration_yields_default() {
        assert_eq!(
            codec().decode(RecordKind::ChatMessages, "\"just a string\"").unwrap(),
            RecordPayload::default_for(RecordKind::ChatMessages)
        );
    }

    #[test]
    fn non_integer_version_is_legacy() {
        let raw = r#"{"version":"2","darkMode":true,"chatPanelWidth":400}"#;
        assert_eq!(RawRecord::parse(RecordKind::GlobalUiState, raw).unwrap().version(), 0);
        assert_eq!(
            codec().decode(RecordKind::GlobalUiState, raw).unwrap(),
            RecordPayload::GlobalUiState(GlobalUiState {
                theme: Theme::Dark,
                chat_panel_width: 400,
                show_page_numbers: true,
            })
        );
    }

    #[test]
    fn legacy_chat_gets_epoch_timestamp_when_missing() {
        let raw = r#"{"messages":[{"id":"7","text":"hi","isUser":true}]}"#;
        let messages = chat(codec().decode(RecordKind::ChatMessages, raw).unwrap()).messages;
        assert_eq!(messages[0].created_at, timestamp::from_millis(0).unwrap());
        assert_eq!(messages[0].role, ChatRole::User);
    }

    #[test]
    fn encode_stamps_current_version() {
        let encoded = codec()
            .encode(&RecordPayload::default_for(RecordKind::ViewerUiState))
            .unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["version"], json!(2));
        assert_eq!(value["currentPage"], json!(1));
    }

    #[test]
    fn empty_registry_passes_matching_legacy_shapes() {
        let codec = Codec::new(MigrationRegistry::empty());
        let raw = r#"{"theme":"light","chatPanelWidth":200,"showPageNumbers":true}"#;
        assert_eq!(
            codec.decode(RecordKind::GlobalUiState, raw).unwrap(),
            RecordPayload::GlobalUiState(GlobalUiState {
                theme: Theme::Light,
                chat_panel_width: 200,
                show_page_numbers: true,
            })
        );
    }
}
