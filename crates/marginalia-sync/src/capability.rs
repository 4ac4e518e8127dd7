//! Lifecycle of the capability that grants access to the sync file.
//!
//! ```text
//! Unsupported (terminal)
//! Unbound ──bind / connect_existing / create_new──▶ Bound
//! Bound ──clear, or failed probe in initialize──▶ Unbound
//! ```
//!
//! The handle lives in a single [`CapabilityStore`] slot; its display name is
//! kept separately in the settings store so it survives a failed probe and
//! the user can be told which file was lost.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_core::{SyncFileDocument, WriteError};
use marginalia_store::{KeyValueStore, StoreError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::{CapabilityHandle, CapabilityHost, FileResource, Grant, SyncError};

const DISPLAY_NAME_KEY: &str = "marginalia/sync/display-name";
const CAPABILITY_SLOT_KEY: &str = "marginalia/sync/capability";

/// Durable single-slot storage for one capability handle.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    async fn load(&self) -> Result<Option<CapabilityHandle>, StoreError>;

    /// Replace the slot's content in one write.
    async fn replace(&self, handle: &CapabilityHandle) -> Result<(), WriteError>;

    async fn clear(&self) -> Result<(), WriteError>;
}

/// [`CapabilityStore`] occupying one fixed key of a [`KeyValueStore`].
pub struct KvCapabilityStore {
    kv: Arc<dyn KeyValueStore>,
}

impl KvCapabilityStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl CapabilityStore for KvCapabilityStore {
    async fn load(&self) -> Result<Option<CapabilityHandle>, StoreError> {
        let Some(raw) = self.kv.get(CAPABILITY_SLOT_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(handle) => Ok(Some(handle)),
            Err(err) => {
                warn!(error = %err, "persisted capability unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    async fn replace(&self, handle: &CapabilityHandle) -> Result<(), WriteError> {
        let raw = serde_json::to_string(handle)?;
        self.kv.put(CAPABILITY_SLOT_KEY, &raw).await
    }

    async fn clear(&self) -> Result<(), WriteError> {
        self.kv.remove(CAPABILITY_SLOT_KEY).await
    }
}

/// Observable state of the [`SyncCapabilityManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The environment cannot grant file access. Terminal.
    Unsupported,
    /// No usable file. `last_display_name` names the file that was bound
    /// before a failed revalidation, if any.
    Unbound { last_display_name: Option<String> },
    Bound { display_name: String },
}

/// A bound sync file together with the lock that serialises every
/// read-modify-write cycle against it within this process.
pub struct SyncTarget {
    handle: CapabilityHandle,
    display_name: String,
    resource: Arc<dyn FileResource>,
    queue: Mutex<()>,
}

impl SyncTarget {
    fn new(grant: Grant, resource: Arc<dyn FileResource>) -> Self {
        Self {
            handle: grant.handle,
            display_name: grant.display_name,
            resource,
            queue: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> &CapabilityHandle {
        &self.handle
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn resource(&self) -> &dyn FileResource {
        self.resource.as_ref()
    }

    /// Wait for exclusive use of the file.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.queue.lock().await
    }
}

enum State {
    Unsupported,
    Unbound { last_display_name: Option<String> },
    Bound(Arc<SyncTarget>),
}

/// Persists, revalidates and hands out the capability for the sync file.
pub struct SyncCapabilityManager {
    host: Arc<dyn CapabilityHost>,
    slot: Arc<dyn CapabilityStore>,
    settings: Arc<dyn KeyValueStore>,
    state: State,
}

impl SyncCapabilityManager {
    pub fn new(
        host: Arc<dyn CapabilityHost>,
        slot: Arc<dyn CapabilityStore>,
        settings: Arc<dyn KeyValueStore>,
    ) -> Self {
        let state = if host.is_supported() {
            State::Unbound {
                last_display_name: None,
            }
        } else {
            State::Unsupported
        };
        Self {
            host,
            slot,
            settings,
            state,
        }
    }

    pub fn state(&self) -> SyncState {
        match &self.state {
            State::Unsupported => SyncState::Unsupported,
            State::Unbound { last_display_name } => SyncState::Unbound {
                last_display_name: last_display_name.clone(),
            },
            State::Bound(target) => SyncState::Bound {
                display_name: target.display_name.clone(),
            },
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    /// The bound file, if any.
    pub fn target(&self) -> Option<Arc<SyncTarget>> {
        match &self.state {
            State::Bound(target) => Some(Arc::clone(target)),
            _ => None,
        }
    }

    /// Restore the persisted capability and check it still works.
    ///
    /// A handle that cannot be opened or read is dropped from the slot; its
    /// display name is kept for messaging.
    pub async fn initialize(&mut self) -> SyncState {
        if matches!(self.state, State::Unsupported) {
            return SyncState::Unsupported;
        }

        let display_name = match self.settings.get(DISPLAY_NAME_KEY).await {
            Ok(name) => name,
            Err(err) => {
                warn!(error = %err, "could not read sync display name");
                None
            }
        };
        let handle = match self.slot.load().await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "could not read persisted capability");
                None
            }
        };
        let Some(handle) = handle else {
            self.state = State::Unbound {
                last_display_name: display_name,
            };
            return self.state();
        };

        let probe = match self.host.open(&handle).await {
            Ok(resource) => {
                let read = resource.read().await;
                read.map(|_| resource)
            }
            Err(err) => Err(err),
        };
        match probe {
            Ok(resource) => {
                let display_name = display_name.unwrap_or_else(|| handle.to_string());
                info!(file = %display_name, "sync file revalidated");
                let grant = Grant {
                    handle,
                    display_name,
                };
                self.state = State::Bound(Arc::new(SyncTarget::new(grant, resource)));
            }
            Err(err) => {
                warn!(handle = %handle, error = %err, "sync file no longer accessible, unbinding");
                if let Err(err) = self.slot.clear().await {
                    warn!(error = %err, "could not clear stale capability");
                }
                self.state = State::Unbound {
                    last_display_name: display_name,
                };
            }
        }
        self.state()
    }

    /// Bind `grant`, replacing any previous binding, and persist it.
    ///
    /// The in-memory binding takes effect even when persisting fails; the
    /// failure is returned as [`SyncError::Write`]. A handle the host cannot
    /// resolve at all is rejected before anything changes, leaving any
    /// previous binding in place. Resolution does no I/O on the file, so a
    /// revoked or unreadable file still binds and surfaces on first use.
    pub async fn bind(&mut self, grant: Grant) -> Result<(), SyncError> {
        if matches!(self.state, State::Unsupported) {
            return Err(SyncError::Unsupported);
        }
        let resource = self.host.open(&grant.handle).await?;
        let handle = grant.handle.clone();
        let display_name = grant.display_name.clone();
        self.state = State::Bound(Arc::new(SyncTarget::new(grant, resource)));
        info!(file = %display_name, "sync file bound");

        self.slot.replace(&handle).await?;
        self.settings.put(DISPLAY_NAME_KEY, &display_name).await?;
        Ok(())
    }

    /// Forget the capability and its display name.
    pub async fn clear(&mut self) -> Result<(), WriteError> {
        if matches!(self.state, State::Unsupported) {
            return Ok(());
        }
        self.state = State::Unbound {
            last_display_name: None,
        };
        info!("sync file unbound");
        self.slot.clear().await?;
        self.settings.remove(DISPLAY_NAME_KEY).await
    }

    /// Ask the user for an existing sync file and bind it. Returns the
    /// bound file's display name.
    pub async fn connect_existing(&mut self) -> Result<String, SyncError> {
        if matches!(self.state, State::Unsupported) {
            return Err(SyncError::Unsupported);
        }
        let grant = self.host.pick_existing().await?;
        let name = grant.display_name.clone();
        self.bind(grant).await?;
        Ok(name)
    }

    /// Ask the user where to create a new sync file, seed it with an empty
    /// document and bind it. Returns the bound file's display name.
    pub async fn create_new(&mut self, suggested_name: &str) -> Result<String, SyncError> {
        if matches!(self.state, State::Unsupported) {
            return Err(SyncError::Unsupported);
        }
        let grant = self.host.create_new(suggested_name).await?;
        let resource = self.host.open(&grant.handle).await?;
        let seed = SyncFileDocument::default().to_json_bytes()?;
        let mut session = resource.create_writable().await?;
        session.write(&seed).await?;
        session.close().await?;

        let name = grant.display_name.clone();
        self.bind(grant).await?;
        Ok(name)
    }
}
