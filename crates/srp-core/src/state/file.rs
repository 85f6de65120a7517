// # File Settings Store
//
// File-based implementation of SettingsStore that survives restarts and
// crashes.
//
// ## Crash Recovery
//
// - Atomic writes: write to a temporary file, then rename
// - Backup: the previous file is copied to `.backup` before each write
// - Recovery: a main file that fails to parse is replaced by the backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "server": {
//     "port": 53535,
//     "saved_at": "2025-01-09T12:00:00Z"
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::settings_store::{ServerInfo, SettingsStore};

/// Settings file format version
const SETTINGS_FILE_VERSION: &str = "1.0";

/// File-based settings store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use srp_core::state::FileSettingsStore;
/// use srp_core::traits::{ServerInfo, SettingsStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::new("/var/lib/srp/settings.json").await?;
///
///     store.save(&ServerInfo::new(53535)).await?;
///     assert_eq!(store.load().await?.map(|info| info.port), Some(53535));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    info: Arc<RwLock<Option<ServerInfo>>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SettingsFileFormat {
    version: String,
    server: Option<ServerInfo>,
}

impl FileSettingsStore {
    /// Create or load a file settings store
    ///
    /// Parent directories are created as needed. A corrupt file is
    /// recovered from its backup; when both are unreadable the store
    /// starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create settings directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let info = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            info: Arc::new(RwLock::new(info)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Option<ServerInfo>, Error> {
        match Self::load_file(path).await {
            Ok(info) => Ok(info),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Settings file {} is corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty settings.");
                    return Ok(None);
                }

                match Self::load_file(&backup_path).await {
                    Ok(info) => {
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore settings file from backup: {}",
                                restore_err
                            );
                        }
                        tracing::info!("Recovered settings from backup");
                        Ok(info)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty settings.",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load_file(path: &Path) -> Result<Option<ServerInfo>, Error> {
        if !path.exists() {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::settings(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: SettingsFileFormat = serde_json::from_str(&content)?;

        if file.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. Attempting to load anyway.",
                SETTINGS_FILE_VERSION,
                file.version
            );
        }

        Ok(file.server)
    }

    async fn write_file(&self, info: Option<&ServerInfo>) -> Result<(), Error> {
        let file = SettingsFileFormat {
            version: SETTINGS_FILE_VERSION.to_string(),
            server: info.cloned(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::settings(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await?;
            temp.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::settings(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Option<ServerInfo>, Error> {
        Ok(self.info.read().await.clone())
    }

    async fn save(&self, info: &ServerInfo) -> Result<(), Error> {
        let mut guard = self.info.write().await;
        self.write_file(Some(info)).await?;
        *guard = Some(info.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.info.write().await;
        self.write_file(None).await?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_port() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&ServerInfo::new(53536)).await.unwrap();
        assert!(path.exists());

        let reopened = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap().map(|info| info.port), Some(53536));
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        store.save(&ServerInfo::new(53535)).await.unwrap();
        store.save(&ServerInfo::new(53536)).await.unwrap();

        let backup_path = FileSettingsStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after second write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(
            recovered.load().await.unwrap().map(|info| info.port),
            Some(53535),
            "Backup should hold the value before the last write"
        );
    }

    #[tokio::test]
    async fn test_file_store_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = FileSettingsStore::new(&path).await.unwrap();
        store.save(&ServerInfo::new(53540)).await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileSettingsStore::new(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), None);
    }
}
