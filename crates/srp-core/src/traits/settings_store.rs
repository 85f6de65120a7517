// # Settings Store Trait
//
// Persists the port the server last served on. In unicast mode the server
// switches to the next port on every restart, so that clients holding
// registrations made against the previous instance re-register instead of
// talking to a server that no longer knows them.
//
// ## Implementations
//
// - `MemorySettingsStore`: tests and ephemeral deployments
// - `FileSettingsStore`: JSON file with atomic writes and a backup copy

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Persisted server information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// UDP port the server was listening on
    pub port: u16,
    /// When the information was saved
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

impl ServerInfo {
    /// Server information for `port`, stamped now
    pub fn new(port: u16) -> Self {
        Self {
            port,
            saved_at: chrono::Utc::now(),
        }
    }
}

/// Trait for settings store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the saved server information
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ServerInfo))`: Saved information
    /// - `Ok(None)`: Nothing saved yet
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<Option<ServerInfo>, crate::Error>;

    /// Save server information, replacing what was stored
    async fn save(&self, info: &ServerInfo) -> Result<(), crate::Error>;

    /// Forget the saved information
    async fn clear(&self) -> Result<(), crate::Error>;
}
