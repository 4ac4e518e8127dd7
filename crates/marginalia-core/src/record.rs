//! Versioned record kinds and their current payload shapes.
//!
//! Each [`RecordKind`] carries its own schema version, independent of the
//! others. The structs in this module describe the *current* version only;
//! older shapes exist solely as JSON and are rewritten by the migration steps
//! in `marginalia-store` before they reach these types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InvalidDocumentId;

/// Stable identifier of a document, derived by the host from the document's
/// content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Accepts any non-empty string without `/`, which is reserved as the
    /// key separator of the local cache.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidDocumentId> {
        let id = id.into();
        if id.is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(InvalidDocumentId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = InvalidDocumentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The closed set of persisted record categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    ChatMessages,
    ViewerUiState,
    GlobalUiState,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::ChatMessages,
        RecordKind::ViewerUiState,
        RecordKind::GlobalUiState,
    ];

    /// Highest schema version this build can read and the version every
    /// write is stamped with.
    pub fn current_version(self) -> u32 {
        match self {
            Self::ChatMessages => 1,
            Self::ViewerUiState => 2,
            Self::GlobalUiState => 2,
        }
    }

    /// Key segment under which records of this kind are stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatMessages => "chat-messages",
            Self::ViewerUiState => "viewer-ui",
            Self::GlobalUiState => "global-ui",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ChatMessages ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessages {
    pub messages: Vec<ChatMessage>,
}

// ── ViewerUIState ──

/// Per-document viewer state, including reading progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerUiState {
    pub current_page: u32,
    pub zoom: f64,
    pub sidebar_open: bool,
    pub sidebar_width: u32,
    pub furthest_page: u32,
}

impl ViewerUiState {
    pub const DEFAULT_SIDEBAR_WIDTH: u32 = 320;

    /// Move to `page`, advancing `furthest_page` if needed.
    pub fn go_to_page(&mut self, page: u32) {
        let page = page.max(1);
        self.current_page = page;
        self.furthest_page = self.furthest_page.max(page);
    }
}

impl Default for ViewerUiState {
    fn default() -> Self {
        Self {
            current_page: 1,
            zoom: 1.0,
            sidebar_open: false,
            sidebar_width: Self::DEFAULT_SIDEBAR_WIDTH,
            furthest_page: 1,
        }
    }
}

// ── GlobalUIState ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Application-wide UI preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUiState {
    pub theme: Theme,
    pub chat_panel_width: u32,
    pub show_page_numbers: bool,
}

impl Default for GlobalUiState {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            chat_panel_width: 360,
            show_page_numbers: true,
        }
    }
}

// ── Payload ──

/// A decoded record of any kind, always in the current schema shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    ChatMessages(ChatMessages),
    ViewerUiState(ViewerUiState),
    GlobalUiState(GlobalUiState),
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::ChatMessages(_) => RecordKind::ChatMessages,
            Self::ViewerUiState(_) => RecordKind::ViewerUiState,
            Self::GlobalUiState(_) => RecordKind::GlobalUiState,
        }
    }

    /// The empty value substituted whenever a record cannot be read.
    pub fn default_for(kind: RecordKind) -> Self {
        match kind {
            RecordKind::ChatMessages => Self::ChatMessages(ChatMessages::default()),
            RecordKind::ViewerUiState => Self::ViewerUiState(ViewerUiState::default()),
            RecordKind::GlobalUiState => Self::GlobalUiState(GlobalUiState::default()),
        }
    }

    /// Validate a current-version body against the shape of `kind`.
    ///
    /// Every field is required; a missing field or a field of the wrong
    /// primitive type is an error.
    pub fn from_body(kind: RecordKind, body: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RecordKind::ChatMessages => Self::ChatMessages(serde_json::from_value(body)?),
            RecordKind::ViewerUiState => Self::ViewerUiState(serde_json::from_value(body)?),
            RecordKind::GlobalUiState => Self::GlobalUiState(serde_json::from_value(body)?),
        })
    }

    pub fn to_body(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::ChatMessages(p) => serde_json::to_value(p),
            Self::ViewerUiState(p) => serde_json::to_value(p),
            Self::GlobalUiState(p) => serde_json::to_value(p),
        }
    }
}

/// A typed payload that can be pulled out of a [`RecordPayload`].
pub trait Record: Default + Into<RecordPayload> {
    const KIND: RecordKind;

    fn from_payload(payload: RecordPayload) -> Option<Self>;
}

macro_rules! impl_record {
    ($ty:ident) => {
        impl From<$ty> for RecordPayload {
            fn from(value: $ty) -> Self {
                RecordPayload::$ty(value)
            }
        }

        impl Record for $ty {
            const KIND: RecordKind = RecordKind::$ty;

            fn from_payload(payload: RecordPayload) -> Option<Self> {
                match payload {
                    RecordPayload::$ty(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

impl_record!(ChatMessages);
impl_record!(ViewerUiState);
impl_record!(GlobalUiState);
