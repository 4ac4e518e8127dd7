//! Title/author inference from document file names.
//!
//! Used when a document carries no embedded metadata. File names in the wild
//! follow a handful of conventions; the first matching rule wins, in this
//! order:
//!
//! 1. Dash: `Author - Title`
//! 2. By: `Title by Author` (case-insensitive)
//! 3. Parentheses: `Title (Author)`
//! 4. Underscore: `some_title_words` becomes `some title words`, no author
//! 5. Fallback: the bare file stem as title, no author

use crate::DocumentMetadata;

const UNTITLED: &str = "Untitled";

/// Infer title and author from a file name or path.
pub fn metadata_from_filename(name: &str) -> DocumentMetadata {
    let stem = file_stem(name);
    let stem = collapse_whitespace(stem);
    if stem.is_empty() {
        return untitled();
    }

    if let Some((author, title)) = split_pair(&stem, " - ") {
        return DocumentMetadata {
            title,
            author: Some(author),
        };
    }

    if let Some(pos) = stem.to_ascii_lowercase().rfind(" by ") {
        if let Some((title, author)) = non_empty_pair(&stem[..pos], &stem[pos + 4..]) {
            return DocumentMetadata {
                title,
                author: Some(author),
            };
        }
    }

    if stem.ends_with(')') {
        if let Some(open) = stem.rfind('(') {
            let inner = &stem[open + 1..stem.len() - 1];
            if let Some((title, author)) = non_empty_pair(&stem[..open], inner) {
                return DocumentMetadata {
                    title,
                    author: Some(author),
                };
            }
        }
    }

    if stem.contains('_') {
        let title = collapse_whitespace(&stem.replace('_', " "));
        if !title.is_empty() {
            return DocumentMetadata {
                title,
                author: None,
            };
        }
        return untitled();
    }

    DocumentMetadata {
        title: stem,
        author: None,
    }
}

fn untitled() -> DocumentMetadata {
    DocumentMetadata {
        title: UNTITLED.to_string(),
        author: None,
    }
}

/// Strip directories and a short alphanumeric extension.
fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(dot) if dot > 0 => {
            let ext = &base[dot + 1..];
            if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                &base[..dot]
            } else {
                base
            }
        }
        _ => base,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_pair(s: &str, sep: &str) -> Option<(String, String)> {
    let (left, right) = s.split_once(sep)?;
    non_empty_pair(left, right)
}

fn non_empty_pair(left: &str, right: &str) -> Option<(String, String)> {
    let left = left.trim();
    let right = right.trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_string(), right.to_string()))
}
