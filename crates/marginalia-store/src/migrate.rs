//! Forward schema migrations for versioned records.
//!
//! A step rewrites the JSON body of one record kind from version `n` to
//! `n + 1` and nothing else. Steps are plain functions over
//! [`serde_json::Value`] so they can describe shapes the typed payloads no
//! longer model. A step returns `None` when its input is beyond repair; the
//! codec then substitutes the kind's default.
//!
//! Version history:
//!
//! - `chat-messages` 0→1: bare arrays are wrapped as `{messages}`; legacy
//!   messages `{id, text, isUser, timestamp}` become
//!   `{id, role, content, createdAt}`.
//! - `viewer-ui` 0→1: `page`→`currentPage`, `scale`→`zoom`.
//! - `viewer-ui` 1→2: adds `sidebarWidth` and `furthestPage`.
//! - `global-ui` 0→1: none registered; unversioned data already has the v1
//!   shape.
//! - `global-ui` 1→2: `darkMode` becomes `theme`, adds `showPageNumbers`.

use std::collections::HashMap;

use marginalia_core::{RecordKind, ViewerUiState, timestamp};
use serde_json::{Map, Value, json};
use tracing::debug;

/// A one-version-forward transform for one record kind.
pub type MigrationStep = fn(Value) -> Option<Value>;

/// Registered migration steps keyed by `(kind, from_version)`.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    steps: HashMap<(RecordKind, u32), MigrationStep>,
}

impl MigrationRegistry {
    /// A registry with no steps: every older version passes through as-is.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The registry holding every built-in step.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(RecordKind::ChatMessages, 0, chat_messages_v0_to_v1)
            .register(RecordKind::ViewerUiState, 0, viewer_ui_v0_to_v1)
            .register(RecordKind::ViewerUiState, 1, viewer_ui_v1_to_v2)
            .register(RecordKind::GlobalUiState, 1, global_ui_v1_to_v2);
        registry
    }

    /// Register the step taking `kind` from `from` to `from + 1`, replacing
    /// any previous step for the same pair.
    pub fn register(&mut self, kind: RecordKind, from: u32, step: MigrationStep) -> &mut Self {
        debug_assert!(
            from < kind.current_version(),
            "migration step {kind} v{from} targets a version past current"
        );
        self.steps.insert((kind, from), step);
        self
    }

    pub fn has_step(&self, kind: RecordKind, from: u32) -> bool {
        self.steps.contains_key(&(kind, from))
    }

    /// Advance `payload` by exactly one version.
    ///
    /// Pairs without a registered step pass the payload through unchanged.
    /// The returned payload is `None` when the step rejected its input.
    pub fn migrate(&self, kind: RecordKind, from: u32, payload: Value) -> (u32, Option<Value>) {
        let to = from + 1;
        match self.steps.get(&(kind, from)) {
            Some(step) => {
                debug!(%kind, from, to, "applying migration step");
                (to, step(payload))
            }
            None => (to, Some(payload)),
        }
    }
}

// ── chat-messages ──

fn chat_messages_v0_to_v1(value: Value) -> Option<Value> {
    let messages = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    let messages: Vec<Value> = messages.into_iter().filter_map(chat_message_v0).collect();
    Some(json!({ "messages": messages }))
}

fn chat_message_v0(message: Value) -> Option<Value> {
    let Value::Object(mut m) = message else {
        return None;
    };
    if m.contains_key("role") {
        return Some(Value::Object(m));
    }

    let id = match m.remove("id")? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let content = m.remove("text").or_else(|| m.remove("content"))?;
    let role = match m.remove("isUser").and_then(|v| v.as_bool()) {
        Some(true) => "user",
        _ => "assistant",
    };
    let created_at = match m.remove("timestamp").or_else(|| m.remove("createdAt")) {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(timestamp::from_millis)
            .map(|dt| Value::String(dt.to_rfc3339()))?,
        Some(Value::String(s)) => Value::String(s),
        _ => Value::String(timestamp::from_millis(0)?.to_rfc3339()),
    };

    let mut out = Map::new();
    out.insert("id".into(), Value::String(id));
    out.insert("role".into(), Value::String(role.into()));
    out.insert("content".into(), content);
    out.insert("createdAt".into(), created_at);
    Some(Value::Object(out))
}

// ── viewer-ui ──

fn viewer_ui_v0_to_v1(value: Value) -> Option<Value> {
    let Value::Object(mut map) = value else {
        return None;
    };
    rename(&mut map, "page", "currentPage");
    rename(&mut map, "scale", "zoom");
    Some(Value::Object(map))
}

fn viewer_ui_v1_to_v2(value: Value) -> Option<Value> {
    let Value::Object(mut map) = value else {
        return None;
    };
    map.entry("sidebarWidth")
        .or_insert_with(|| json!(ViewerUiState::DEFAULT_SIDEBAR_WIDTH));
    if !map.contains_key("furthestPage") {
        let furthest = map.get("currentPage").cloned().unwrap_or(json!(1));
        map.insert("furthestPage".into(), furthest);
    }
    Some(Value::Object(map))
}

// ── global-ui ──

fn global_ui_v1_to_v2(value: Value) -> Option<Value> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let theme = match map.remove("darkMode") {
        Some(Value::Bool(true)) => "dark",
        Some(Value::Bool(false)) => "light",
        _ => "system",
    };
    map.entry("theme").or_insert_with(|| json!(theme));
    map.entry("showPageNumbers").or_insert(json!(true));
    Some(Value::Object(map))
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.remove(from) {
        map.entry(to).or_insert(value);
    }
}
