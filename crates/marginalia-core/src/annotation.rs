//! Document annotations: highlights, free-standing notes and bookmarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// An axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A text selection on a page.
///
/// Multi-line selections keep one rectangle per line in `line_rects`, in
/// reading order; `rect` is the bounding box of the whole selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    pub page_number: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_rects: Vec<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A note, optionally pinned to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    pub page_number: u32,
}

/// A single annotation, discriminated on the wire by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Highlight(Highlight),
    Note(Note),
    Bookmark(Bookmark),
}

impl Annotation {
    pub fn id(&self) -> &str {
        match self {
            Self::Highlight(h) => &h.id,
            Self::Note(n) => &n.id,
            Self::Bookmark(b) => &b.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Highlight(h) => h.created_at,
            Self::Note(n) => n.created_at,
            Self::Bookmark(b) => b.created_at,
        }
    }

    pub fn page_number(&self) -> Option<u32> {
        match self {
            Self::Highlight(h) => Some(h.page_number),
            Self::Note(n) => n.page_number,
            Self::Bookmark(b) => Some(b.page_number),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Highlight(_) => "highlight",
            Self::Note(_) => "note",
            Self::Bookmark(_) => "bookmark",
        }
    }

    fn bookmark_page(&self) -> Option<u32> {
        match self {
            Self::Bookmark(b) => Some(b.page_number),
            _ => None,
        }
    }
}

/// What [`AnnotationSet::add`] did with its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended as a new annotation.
    Added,
    /// An annotation with the same id existed and was replaced in place.
    Replaced,
    /// The page was already bookmarked; the existing bookmark was removed
    /// and the new one discarded.
    BookmarkRemoved,
}

/// The annotations of one document, in insertion order.
///
/// Holds at most one bookmark per page: adding a bookmark for a page that
/// already has one removes it instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationSet {
    items: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary input, dropping duplicate ids and
    /// duplicate bookmarks (first occurrence wins).
    pub fn from_vec(items: Vec<Annotation>) -> Self {
        let mut set = Self::new();
        for item in items {
            set.insert_if_absent(item);
        }
        set
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Annotation> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.items.iter().find(|a| a.id() == id)
    }

    pub fn add(&mut self, annotation: Annotation) -> AddOutcome {
        if let Some(page) = annotation.bookmark_page() {
            if let Some(pos) = self
                .items
                .iter()
                .position(|a| a.bookmark_page() == Some(page) && a.id() != annotation.id())
            {
                self.items.remove(pos);
                return AddOutcome::BookmarkRemoved;
            }
        }

        match self.items.iter_mut().find(|a| a.id() == annotation.id()) {
            Some(existing) => {
                *existing = annotation;
                AddOutcome::Replaced
            }
            None => {
                self.items.push(annotation);
                AddOutcome::Added
            }
        }
    }

    /// Toggle the bookmark on `page`. Returns `true` when the page ends up
    /// bookmarked.
    pub fn toggle_bookmark(&mut self, page: u32, id: String, created_at: DateTime<Utc>) -> bool {
        let bookmark = Annotation::Bookmark(Bookmark {
            id,
            created_at,
            page_number: page,
        });
        self.add(bookmark) == AddOutcome::Added
    }

    pub fn remove(&mut self, id: &str) -> Option<Annotation> {
        let pos = self.items.iter().position(|a| a.id() == id)?;
        Some(self.items.remove(pos))
    }

    /// Replace the note text of a highlight or the content of a note.
    ///
    /// An empty string clears a highlight's note. Bookmarks carry no text,
    /// so updating one returns `false`.
    pub fn update_note(&mut self, id: &str, text: &str) -> bool {
        match self.items.iter_mut().find(|a| a.id() == id) {
            Some(Annotation::Highlight(h)) => {
                h.note = (!text.is_empty()).then(|| text.to_string());
                true
            }
            Some(Annotation::Note(n)) => {
                n.content = text.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn is_bookmarked(&self, page: u32) -> bool {
        self.items.iter().any(|a| a.bookmark_page() == Some(page))
    }

    /// Bookmarked pages in ascending order.
    pub fn bookmarked_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.items.iter().filter_map(|a| a.bookmark_page()).collect();
        pages.sort_unstable();
        pages
    }

    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.items
            .iter()
            .filter(move |a| a.page_number() == Some(page))
    }

    /// Union with `other` by id. Annotations already present win over
    /// incoming ones with the same id, and an incoming bookmark for an
    /// already-bookmarked page is ignored rather than toggled. The result is
    /// ordered by creation time, then id.
    pub fn merge(&mut self, other: impl IntoIterator<Item = Annotation>) -> usize {
        let before = self.items.len();
        for item in other {
            self.insert_if_absent(item);
        }
        self.items
            .sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        self.items.len() - before
    }

    fn insert_if_absent(&mut self, item: Annotation) {
        if self.get(item.id()).is_some() {
            return;
        }
        if let Some(page) = item.bookmark_page() {
            if self.is_bookmarked(page) {
                return;
            }
        }
        self.items.push(item);
    }
}

impl From<Vec<Annotation>> for AnnotationSet {
    fn from(items: Vec<Annotation>) -> Self {
        Self::from_vec(items)
    }
}

impl IntoIterator for AnnotationSet {
    type Item = Annotation;
    type IntoIter = std::vec::IntoIter<Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Read a stored annotation array entry by entry. Entries that do not parse
/// (an unknown `type` from a newer client, a missing field) are skipped with
/// a warning instead of failing the whole array.
pub fn annotations_from_values(items: Vec<Value>, source: &str) -> Vec<Annotation> {
    let total = items.len();
    let parsed: Vec<Annotation> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if parsed.len() < total {
        warn!(source, skipped = total - parsed.len(), "skipped unrecognised annotations");
    }
    parsed
}

/// Serialise `annotations` for storage, carrying forward the entries of
/// `previous` that this build cannot parse. A carried entry is dropped once
/// an annotation with the same id is written in its place.
pub fn annotations_to_values(
    annotations: &[Annotation],
    previous: Vec<Value>,
) -> Result<Vec<Value>, serde_json::Error> {
    let mut out = annotations
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    let carried = previous.into_iter().filter(|item| {
        serde_json::from_value::<Annotation>(item.clone()).is_err()
            && raw_id(item).is_none_or(|id| annotations.iter().all(|a| a.id() != id))
    });
    out.extend(carried);
    Ok(out)
}

fn raw_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::from_millis;

    fn at(millis: i64) -> DateTime<Utc> {
        from_millis(millis).unwrap()
    }

    fn bookmark(id: &str, page: u32) -> Annotation {
        Annotation::Bookmark(Bookmark {
            id: id.into(),
            created_at: at(1_000),
            page_number: page,
        })
    }

    fn highlight(id: &str, page: u32, millis: i64) -> Annotation {
        Annotation::Highlight(Highlight {
            id: id.into(),
            created_at: at(millis),
            page_number: page,
            text: "selected text".into(),
            rect: None,
            line_rects: Vec::new(),
            note: None,
            color: Some("yellow".into()),
        })
    }

    #[test]
    fn bookmark_twice_removes_it() {
        let mut set = AnnotationSet::new();
        assert!(set.toggle_bookmark(7, "1".into(), at(1)));
        assert!(!set.toggle_bookmark(7, "2".into(), at(2)));
        assert!(!set.is_bookmarked(7));
        assert!(set.is_empty());
    }

    #[test]
    fn bookmarks_on_distinct_pages_coexist() {
        let mut set = AnnotationSet::new();
        assert_eq!(set.add(bookmark("1", 9)), AddOutcome::Added);
        assert_eq!(set.add(bookmark("2", 3)), AddOutcome::Added);
        assert_eq!(set.bookmarked_pages(), vec![3, 9]);
    }

    #[test]
    fn same_id_replaces_in_place() {
        let mut set = AnnotationSet::new();
        set.add(highlight("a", 1, 10));
        set.add(highlight("b", 2, 20));
        let mut updated = highlight("a", 1, 10);
        if let Annotation::Highlight(h) = &mut updated {
            h.color = Some("green".into());
        }
        assert_eq!(set.add(updated.clone()), AddOutcome::Replaced);
        assert_eq!(set.as_slice()[0], updated);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn update_note_on_highlight_and_note() {
        let mut set = AnnotationSet::new();
        set.add(highlight("h", 4, 10));
        set.add(Annotation::Note(Note {
            id: "n".into(),
            created_at: at(20),
            content: "draft".into(),
            page_number: None,
        }));
        set.add(bookmark("b", 4));

        assert!(set.update_note("h", "worth citing"));
        assert!(set.update_note("n", "final"));
        assert!(!set.update_note("b", "nope"));
        assert!(!set.update_note("missing", "nope"));

        match set.get("h") {
            Some(Annotation::Highlight(h)) => assert_eq!(h.note.as_deref(), Some("worth citing")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(set.update_note("h", ""));
        match set.get("h") {
            Some(Annotation::Highlight(h)) => assert!(h.note.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn on_page_filters() {
        let mut set = AnnotationSet::new();
        set.add(highlight("a", 1, 10));
        set.add(highlight("b", 2, 20));
        set.add(bookmark("c", 2));
        let ids: Vec<&str> = set.on_page(2).map(Annotation::id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn merge_keeps_local_and_skips_duplicate_bookmarks() {
        let mut local = AnnotationSet::from_vec(vec![highlight("a", 1, 30), bookmark("b1", 5)]);
        let mut remote_a = highlight("a", 1, 30);
        if let Annotation::Highlight(h) = &mut remote_a {
            h.text = "remote text".into();
        }
        let added = local.merge(vec![remote_a, bookmark("b2", 5), highlight("c", 3, 5)]);

        assert_eq!(added, 1);
        let ids: Vec<&str> = local.iter().map(Annotation::id).collect();
        assert_eq!(ids, vec!["c", "a", "b1"]);
        match local.get("a") {
            Some(Annotation::Highlight(h)) => assert_eq!(h.text, "selected text"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(local.bookmarked_pages(), vec![5]);
    }

    #[test]
    fn wire_format_uses_type_tag_and_camel_case() {
        let json = serde_json::to_value(bookmark("1", 12)).unwrap();
        assert_eq!(json["type"], "bookmark");
        assert_eq!(json["pageNumber"], 12);
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn highlight_with_line_rects_parses() {
        let json = r##"{
            "type": "highlight",
            "id": "1712000000000",
            "createdAt": "2024-04-01T19:33:20Z",
            "pageNumber": 3,
            "text": "two lines",
            "rect": {"x": 10, "y": 20, "width": 100, "height": 24},
            "lineRects": [
                {"x": 10, "y": 20, "width": 100, "height": 12},
                {"x": 10, "y": 32, "width": 40, "height": 12}
            ],
            "color": "#ffeb3b"
        }"##;
        let parsed: Annotation = serde_json::from_str(json).unwrap();
        match parsed {
            Annotation::Highlight(h) => {
                assert_eq!(h.line_rects.len(), 2);
                assert_eq!(h.line_rects[1].width, 40.0);
                assert!(h.note.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bookmark_requires_page_number() {
        let json = r#"{"type":"bookmark","id":"1","createdAt":"2024-04-01T19:33:20Z"}"#;
        assert!(serde_json::from_str::<Annotation>(json).is_err());
    }

    #[test]
    fn unrecognised_entries_are_skipped_individually() {
        let items = vec![
            serde_json::to_value(bookmark("1", 2)).unwrap(),
            serde_json::json!({"type":"underline","id":"u1","createdAt":"2024-04-01T19:33:20Z"}),
        ];
        let parsed = annotations_from_values(items, "test");
        assert_eq!(parsed, vec![bookmark("1", 2)]);
    }

    #[test]
    fn unrecognised_entries_are_carried_forward() {
        let underline =
            serde_json::json!({"type":"underline","id":"u1","createdAt":"2024-04-01T19:33:20Z"});
        let numeric = serde_json::json!({"type":"bookmark","id":2,"pageNumber":4});
        let previous = vec![
            serde_json::to_value(bookmark("old", 1)).unwrap(),
            underline.clone(),
            numeric.clone(),
        ];

        let values = annotations_to_values(&[bookmark("1", 9)], previous.clone()).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["id"], "1");
        assert_eq!(values[1], underline);
        assert_eq!(values[2], numeric);

        // A parsed annotation reusing the id replaces the carried entry.
        let values = annotations_to_values(&[bookmark("2", 4)], previous).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], underline);
    }
}
