//! In-memory fakes of the file-access collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    CapabilityHandle, CapabilityHost, FileResource, Grant, ResourceError, ResourceMetadata,
    WritableSession,
};

#[derive(Default)]
pub struct FakeFile {
    contents: Mutex<Vec<u8>>,
    revoked: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FakeFile {
    pub fn with_contents(contents: &str) -> Arc<Self> {
        let file = Self::default();
        *file.contents.lock().unwrap() = contents.as_bytes().to_vec();
        Arc::new(file)
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.contents.lock().unwrap().clone()).unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.contents()).unwrap()
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn io_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ResourceError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(ResourceError::PermissionDenied("fake".into()));
        }
        Ok(())
    }
}

struct FakeSession {
    file: Arc<FakeFile>,
    staged: Vec<u8>,
}

#[async_trait]
impl WritableSession for FakeSession {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ResourceError> {
        tokio::task::yield_now().await;
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ResourceError> {
        let FakeSession { file, staged } = *self;
        file.check()?;
        tokio::task::yield_now().await;
        *file.contents.lock().unwrap() = staged;
        Ok(())
    }
}

#[async_trait]
impl FileResource for Arc<FakeFile> {
    async fn read(&self) -> Result<Vec<u8>, ResourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        tokio::task::yield_now().await;
        Ok(self.contents.lock().unwrap().clone())
    }

    async fn create_writable(&self) -> Result<Box<dyn WritableSession>, ResourceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Box::new(FakeSession {
            file: Arc::clone(self),
            staged: Vec::new(),
        }))
    }

    async fn metadata(&self) -> Result<ResourceMetadata, ResourceError> {
        self.check()?;
        Ok(ResourceMetadata {
            last_modified: Utc::now(),
        })
    }
}

/// Host whose files live in a map keyed by handle token. The next pick is
/// set with [`FakeHost::select`]; without a selection, picks are cancelled.
#[derive(Default)]
pub struct FakeHost {
    files: Mutex<HashMap<String, Arc<FakeFile>>>,
    selection: Mutex<Option<String>>,
    pub unsupported: bool,
}

impl FakeHost {
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    pub fn add(&self, token: &str, file: Arc<FakeFile>) {
        self.files.lock().unwrap().insert(token.to_string(), file);
    }

    pub fn file(&self, token: &str) -> Arc<FakeFile> {
        self.files.lock().unwrap()[token].clone()
    }

    pub fn select(&self, token: &str) {
        *self.selection.lock().unwrap() = Some(token.to_string());
    }

    fn grant(token: &str) -> Grant {
        Grant {
            handle: CapabilityHandle::new(token),
            display_name: format!("{token}.json"),
        }
    }
}

#[async_trait]
impl CapabilityHost for FakeHost {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    async fn open(&self, handle: &CapabilityHandle) -> Result<Arc<dyn FileResource>, ResourceError> {
        let file = self
            .files
            .lock()
            .unwrap()
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(handle.to_string()))?;
        Ok(Arc::new(file))
    }

    async fn pick_existing(&self) -> Result<Grant, ResourceError> {
        let token = self.selection.lock().unwrap().take().ok_or(ResourceError::Cancelled)?;
        if !self.files.lock().unwrap().contains_key(&token) {
            return Err(ResourceError::NotFound(token));
        }
        Ok(Self::grant(&token))
    }

    async fn create_new(&self, suggested_name: &str) -> Result<Grant, ResourceError> {
        let token = self
            .selection
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| suggested_name.to_string());
        self.add(&token, Arc::new(FakeFile::default()));
        Ok(Self::grant(&token))
    }
}
