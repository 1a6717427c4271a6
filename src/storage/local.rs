//! Local filesystem watermark store.
//!
//! The whole ledger lives in one JSON file. Writes go to a sibling
//! `.tmp` file which is then renamed over the original, so a crash during
//! [`persist`](WatermarkStore::persist) leaves either the old or the new
//! ledger on disk, never a torn one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Marker;
use crate::storage::{Ledger, WatermarkStore};

/// JSON file backed watermark store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    ledger: Ledger,
}

impl JsonFileStore {
    /// Load the ledger from `path`.
    ///
    /// A missing file yields an empty ledger. A file that exists but does
    /// not parse is reported as [`AppError::StoreCorrupt`] and left untouched.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ledger = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::store_corrupt(&path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No marker file at {}, starting empty", path.display());
                Ledger::new()
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        log::debug!(
            "Loaded {} destinations from {}",
            ledger.len(),
            path.display()
        );
        Ok(Self { path, ledger })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Sibling temp file: the full file name plus `.tmp`.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for JsonFileStore {
    fn get(&self, destination: &str, group_key: &str) -> Option<Marker> {
        self.ledger
            .get(destination)
            .and_then(|groups| groups.get(group_key))
            .cloned()
    }

    fn put(&mut self, destination: &str, group_key: &str, marker: Marker) {
        self.ledger
            .entry(destination.to_string())
            .or_default()
            .insert(group_key.to_string(), marker);
    }

    async fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.ledger)?;
        self.write_bytes(&bytes).await?;
        log::debug!("Markers persisted to {}", self.path.display());
        Ok(())
    }

    fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}
