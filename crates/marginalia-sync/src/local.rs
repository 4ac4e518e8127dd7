//! [`CapabilityHost`] backed by the local filesystem.
//!
//! A handle is the file's absolute path. There is no interactive picker:
//! the "user's choice" is the path the host was constructed with, which the
//! CLI takes from its arguments. Without one, every pick is cancelled.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    CapabilityHandle, CapabilityHost, FileResource, Grant, ResourceError, ResourceMetadata,
    WritableSession,
};

#[derive(Debug, Clone, Default)]
pub struct LocalFileHost {
    selection: Option<PathBuf>,
}

impl LocalFileHost {
    /// A host that can reopen handles but cancels every pick.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose next pick resolves to `path`. For
    /// [`CapabilityHost::create_new`], `path` may be a directory, in which
    /// case the suggested name is created inside it.
    pub fn with_selection(path: impl Into<PathBuf>) -> Self {
        Self {
            selection: Some(path.into()),
        }
    }

    fn grant(path: &Path) -> Grant {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Grant {
            handle: CapabilityHandle::new(path.display().to_string()),
            display_name,
        }
    }
}

#[async_trait]
impl CapabilityHost for LocalFileHost {
    fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, handle: &CapabilityHandle) -> Result<Arc<dyn FileResource>, ResourceError> {
        Ok(Arc::new(LocalFile {
            path: PathBuf::from(handle.as_str()),
        }))
    }

    async fn pick_existing(&self) -> Result<Grant, ResourceError> {
        let selection = self.selection.as_ref().ok_or(ResourceError::Cancelled)?;
        let path = tokio::fs::canonicalize(selection)
            .await
            .map_err(|e| ResourceError::from_io(e, selection))?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, &path))?;
        if !meta.is_file() {
            return Err(ResourceError::NotFound(path.display().to_string()));
        }
        Ok(Self::grant(&path))
    }

    async fn create_new(&self, suggested_name: &str) -> Result<Grant, ResourceError> {
        let selection = self.selection.as_ref().ok_or(ResourceError::Cancelled)?;
        let path = if tokio::fs::metadata(selection)
            .await
            .is_ok_and(|m| m.is_dir())
        {
            selection.join(file_name_for(suggested_name))
        } else {
            selection.clone()
        };

        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, &path))?;
        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| ResourceError::from_io(e, &path))?;
        debug!(path = %path.display(), "created sync file");
        Ok(Self::grant(&path))
    }
}

fn file_name_for(suggested_name: &str) -> String {
    if suggested_name.ends_with(".json") {
        suggested_name.to_string()
    } else {
        format!("{suggested_name}.json")
    }
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileResource for LocalFile {
    async fn read(&self) -> Result<Vec<u8>, ResourceError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ResourceError::from_io(e, &self.path))
    }

    async fn create_writable(&self) -> Result<Box<dyn WritableSession>, ResourceError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| ResourceError::NotFound(self.path.display().to_string()))?;
        let meta = tokio::fs::metadata(dir)
            .await
            .map_err(|e| ResourceError::from_io(e, dir))?;
        if meta.permissions().readonly() {
            return Err(ResourceError::PermissionDenied(dir.display().to_string()));
        }
        Ok(Box::new(LocalSession {
            path: self.path.clone(),
            staged: Vec::new(),
        }))
    }

    async fn metadata(&self) -> Result<ResourceMetadata, ResourceError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ResourceError::from_io(e, &self.path))?;
        let modified = meta
            .modified()
            .map_err(|e| ResourceError::from_io(e, &self.path))?;
        Ok(ResourceMetadata {
            last_modified: DateTime::<Utc>::from(modified),
        })
    }
}

/// Buffers writes and replaces the file atomically on close.
struct LocalSession {
    path: PathBuf,
    staged: Vec<u8>,
}

#[async_trait]
impl WritableSession for LocalSession {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ResourceError> {
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ResourceError> {
        let LocalSession { path, staged } = *self;
        let len = staged.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ResourceError> {
            let dir = target
                .parent()
                .ok_or_else(|| ResourceError::NotFound(target.display().to_string()))?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| ResourceError::from_io(e, dir))?;
            tmp.write_all(&staged)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)
                .map_err(|e| ResourceError::from_io(e.error, &target))?;
            Ok(())
        })
        .await
        .map_err(|e| ResourceError::Io(std::io::Error::other(e)))??;
        debug!(path = %path.display(), bytes = len, "wrote sync file");
        Ok(())
    }
}
