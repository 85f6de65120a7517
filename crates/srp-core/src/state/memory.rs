// # Memory Settings Store
//
// In-memory implementation of SettingsStore.
//
// Nothing survives a restart, so a unicast server always starts on the
// first port of its range. Useful for tests and for deployments where
// clients re-registering after a restart is acceptable.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::settings_store::{ServerInfo, SettingsStore};

/// In-memory settings store
///
/// Clones share the same storage, so a test can keep a handle on what the
/// engine saved.
///
/// # Example
///
/// ```rust,no_run
/// use srp_core::state::MemorySettingsStore;
/// use srp_core::traits::{ServerInfo, SettingsStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new();
///
///     store.save(&ServerInfo::new(53535)).await?;
///     assert_eq!(store.load().await?.map(|info| info.port), Some(53535));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<RwLock<Option<ServerInfo>>>,
}

impl MemorySettingsStore {
    /// Create an empty memory settings store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with `info`
    pub fn with_info(info: ServerInfo) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(info))),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Option<ServerInfo>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, info: &ServerInfo) -> Result<(), Error> {
        *self.inner.write().await = Some(info.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        *self.inner.write().await = None;
        Ok(())
    }
}
