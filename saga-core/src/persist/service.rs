//! Storage backends for checkpoints and gallery images.

use super::saved::{GalleryItem, SavedGame};
use crate::id::{GalleryId, SaveId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// External storage for checkpoints and images.
///
/// Implementations may be eventually consistent. Errors are reported to
/// the caller and never retried here.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Every stored checkpoint, in no particular order.
    async fn get_all(&self) -> Result<Vec<SavedGame>, PersistError>;

    /// Insert or overwrite a checkpoint.
    async fn save(&self, game: &SavedGame) -> Result<(), PersistError>;

    async fn save_many(&self, games: &[SavedGame]) -> Result<(), PersistError> {
        for game in games {
            self.save(game).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: SaveId) -> Result<(), PersistError>;

    async fn delete_many(&self, ids: &[SaveId]) -> Result<(), PersistError> {
        for id in ids {
            self.delete(*id).await?;
        }
        Ok(())
    }

    async fn get_gallery(&self) -> Result<Vec<GalleryItem>, PersistError>;

    async fn save_gallery_item(&self, item: &GalleryItem) -> Result<(), PersistError>;

    async fn delete_gallery_item(&self, id: GalleryId) -> Result<(), PersistError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: RwLock<HashMap<SaveId, SavedGame>>,
    gallery: RwLock<HashMap<GalleryId, GalleryItem>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Backend("writes disabled".into()));
        }
        Ok(())
    }

    /// Number of stored checkpoints.
    pub async fn len(&self) -> usize {
        self.saves.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.saves.read().await.is_empty()
    }
}

#[async_trait]
impl PersistenceService for MemoryStore {
    async fn get_all(&self) -> Result<Vec<SavedGame>, PersistError> {
        Ok(self.saves.read().await.values().cloned().collect())
    }

    async fn save(&self, game: &SavedGame) -> Result<(), PersistError> {
        self.check_writable()?;
        self.saves.write().await.insert(game.id, game.clone());
        Ok(())
    }

    async fn delete(&self, id: SaveId) -> Result<(), PersistError> {
        self.check_writable()?;
        self.saves
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PersistError::NotFound(id.to_string()))
    }

    async fn get_gallery(&self) -> Result<Vec<GalleryItem>, PersistError> {
        Ok(self.gallery.read().await.values().cloned().collect())
    }

    async fn save_gallery_item(&self, item: &GalleryItem) -> Result<(), PersistError> {
        self.check_writable()?;
        self.gallery.write().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_gallery_item(&self, id: GalleryId) -> Result<(), PersistError> {
        self.check_writable()?;
        self.gallery
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PersistError::NotFound(id.to_string()))
    }
}

/// One pretty-printed JSON file per record.
///
/// ```text
/// <root>/saves/<save-id>.json
/// <root>/gallery/<gallery-id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Use `root` as the store directory. Subdirectories are created on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn saves_dir(&self) -> PathBuf {
        self.root.join("saves")
    }

    fn gallery_dir(&self) -> PathBuf {
        self.root.join("gallery")
    }

    async fn write_record<T: Serialize>(dir: &Path, id: &str, record: &T) -> Result<(), PersistError> {
        fs::create_dir_all(dir).await?;
        let content = serde_json::to_string_pretty(record)?;
        let tmp = dir.join(format!("{id}.json.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, dir.join(format!("{id}.json"))).await?;
        Ok(())
    }

    async fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, PersistError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    async fn remove_record(dir: &Path, id: &str) -> Result<(), PersistError> {
        match fs::remove_file(dir.join(format!("{id}.json"))).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PersistenceService for JsonDirStore {
    async fn get_all(&self) -> Result<Vec<SavedGame>, PersistError> {
        Self::read_records(&self.saves_dir()).await
    }

    async fn save(&self, game: &SavedGame) -> Result<(), PersistError> {
        Self::write_record(&self.saves_dir(), &game.id.to_string(), game).await
    }

    async fn delete(&self, id: SaveId) -> Result<(), PersistError> {
        Self::remove_record(&self.saves_dir(), &id.to_string()).await
    }

    async fn get_gallery(&self) -> Result<Vec<GalleryItem>, PersistError> {
        Self::read_records(&self.gallery_dir()).await
    }

    async fn save_gallery_item(&self, item: &GalleryItem) -> Result<(), PersistError> {
        Self::write_record(&self.gallery_dir(), &item.id.to_string(), item).await
    }

    async fn delete_gallery_item(&self, id: GalleryId) -> Result<(), PersistError> {
        Self::remove_record(&self.gallery_dir(), &id.to_string()).await
    }
}
