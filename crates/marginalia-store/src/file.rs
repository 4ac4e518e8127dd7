//! Directory-backed key-value store: one file per key.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use marginalia_core::WriteError;
use tracing::debug;

use crate::{KeyValueStore, StoreError};

/// Persistent [`KeyValueStore`] keeping each entry in its own file under a
/// root directory.
///
/// Keys are escaped into flat file names (`%XX` for every byte outside
/// `[A-Za-z0-9._-]`). Writes go to a temp file in the same directory that is
/// then renamed over the target, so a reader sees either the old or the new
/// value, never a torn one.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open or create a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(escape_key(key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::NotUtf8 { key: key.to_string() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), WriteError> {
        let root = self.root.clone();
        let target = self.path_for(key);
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), WriteError> {
            let mut staged = tempfile::NamedTempFile::new_in(&root)?;
            staged.write_all(value.as_bytes())?;
            staged.as_file().sync_all()?;
            staged.persist(&target).map_err(|e| WriteError::from(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| WriteError::Unavailable(format!("write task failed: {e}")))??;
        debug!(key, "stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WriteError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(unescape_key) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`escape_key`]. Returns `None` for names this store did not
/// write, such as staged temp files.
fn unescape_key(name: &str) -> Option<String> {
    if name.starts_with('.') {
        return None;
    }
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
