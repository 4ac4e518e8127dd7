//! Folding the external sync document back into the local cache's view.

use marginalia_core::{AnnotationSet, SyncFileDocument, ViewerUiState};

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub annotations: AnnotationSet,
    pub viewer: ViewerUiState,
    /// Annotations taken from the remote side.
    pub imported: usize,
}

/// Merge a remote sync document into local state.
///
/// Annotations are unioned by id with local copies winning, and a remote
/// bookmark on a page the local side already bookmarked is ignored.
/// `furthest_page` becomes the larger of both sides. A local viewer still on
/// page 1 resumes at the remote `last_page_read`.
pub fn reconcile(
    mut local: AnnotationSet,
    mut viewer: ViewerUiState,
    remote: SyncFileDocument,
) -> Reconciled {
    let imported = local.merge(remote.annotations);

    if let Some(furthest) = remote.furthest_page {
        viewer.furthest_page = viewer.furthest_page.max(furthest);
    }
    if let Some(last) = remote.last_page_read.filter(|&p| p > 0) {
        if viewer.current_page <= 1 {
            viewer.go_to_page(last);
        }
    }

    Reconciled {
        annotations: local,
        viewer,
        imported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::timestamp::from_millis;
    use marginalia_core::{Annotation, Bookmark, Note};

    fn note(id: &str, content: &str, millis: i64) -> Annotation {
        Annotation::Note(Note {
            id: id.into(),
            created_at: from_millis(millis).unwrap(),
            content: content.into(),
            page_number: Some(1),
        })
    }

    fn bookmark(id: &str, page: u32, millis: i64) -> Annotation {
        Annotation::Bookmark(Bookmark {
            id: id.into(),
            created_at: from_millis(millis).unwrap(),
            page_number: page,
        })
    }

    #[test]
    fn local_wins_on_id_clash() {
        let local = AnnotationSet::from_vec(vec![note("1", "local", 10)]);
        let remote = SyncFileDocument {
            annotations: vec![note("1", "remote", 10), note("2", "new", 20)],
            ..SyncFileDocument::default()
        };
        let merged = reconcile(local, ViewerUiState::default(), remote);
        assert_eq!(merged.imported, 1);
        assert_eq!(merged.annotations.len(), 2);
        match merged.annotations.get("1") {
            Some(Annotation::Note(n)) => assert_eq!(n.content, "local"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_bookmark_on_bookmarked_page_is_ignored() {
        let local = AnnotationSet::from_vec(vec![bookmark("a", 3, 10)]);
        let remote = SyncFileDocument {
            annotations: vec![bookmark("b", 3, 20), bookmark("c", 4, 30)],
            ..SyncFileDocument::default()
        };
        let merged = reconcile(local, ViewerUiState::default(), remote);
        assert_eq!(merged.annotations.bookmarked_pages(), vec![3, 4]);
        assert!(merged.annotations.get("b").is_none());
    }

    #[test]
    fn furthest_page_takes_maximum() {
        let mut viewer = ViewerUiState::default();
        viewer.go_to_page(40);
        let remote = SyncFileDocument {
            furthest_page: Some(25),
            last_page_read: Some(25),
            ..SyncFileDocument::default()
        };
        let merged = reconcile(AnnotationSet::new(), viewer, remote);
        assert_eq!(merged.viewer.furthest_page, 40);
        assert_eq!(merged.viewer.current_page, 40);

        let remote = SyncFileDocument {
            furthest_page: Some(90),
            ..SyncFileDocument::default()
        };
        let merged = reconcile(AnnotationSet::new(), merged.viewer, remote);
        assert_eq!(merged.viewer.furthest_page, 90);
    }

    #[test]
    fn fresh_viewer_resumes_at_remote_position() {
        let remote = SyncFileDocument {
            furthest_page: Some(12),
            last_page_read: Some(9),
            ..SyncFileDocument::default()
        };
        let merged = reconcile(AnnotationSet::new(), ViewerUiState::default(), remote);
        assert_eq!(merged.viewer.current_page, 9);
        assert_eq!(merged.viewer.furthest_page, 12);
    }

    #[test]
    fn empty_remote_changes_nothing() {
        let local = AnnotationSet::from_vec(vec![note("1", "x", 1)]);
        let merged = reconcile(local.clone(), ViewerUiState::default(), SyncFileDocument::default());
        assert_eq!(merged.annotations, local);
        assert_eq!(merged.viewer, ViewerUiState::default());
        assert_eq!(merged.imported, 0);
    }
}
