//! Checkpoint policy on top of a [`PersistenceService`].

use super::saved::{GalleryItem, GalleryKind, SaveType, SavedGame};
use super::service::{PersistError, PersistenceService};
use crate::id::{SaveId, SegmentId, SessionId};
use crate::story::GameContext;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of a checkpoint request.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    Saved(SavedGame),
    /// An equivalent checkpoint already exists; nothing was written.
    AlreadySaved,
}

impl CheckpointOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, CheckpointOutcome::Saved(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CheckpointKey {
    session: SessionId,
    story: Option<SegmentId>,
    save_type: SaveType,
}

impl CheckpointKey {
    fn of(game: &SavedGame) -> Self {
        Self {
            session: game.session_id,
            story: game.story_id,
            save_type: game.save_type,
        }
    }

    /// Whether an existing checkpoint `other` makes a new one redundant.
    fn covers(&self, other: &CheckpointKey) -> bool {
        if self.session != other.session {
            return false;
        }
        match self.save_type {
            SaveType::Auto => other.save_type == SaveType::Auto && other.story == self.story,
            SaveType::Manual => other.story == self.story,
            SaveType::Setup => other.save_type == SaveType::Setup,
        }
    }
}

/// Builds checkpoints, deduplicates them and keeps a bounded undo stack
/// of deletions.
pub struct PersistenceCoordinator {
    service: Arc<dyn PersistenceService>,
    /// Keys written or in flight during this process lifetime.
    index: Mutex<HashSet<CheckpointKey>>,
    undo: Mutex<VecDeque<Vec<SavedGame>>>,
    undo_depth: usize,
}

impl PersistenceCoordinator {
    pub fn new(service: Arc<dyn PersistenceService>, undo_depth: usize) -> Self {
        Self {
            service,
            index: Mutex::new(HashSet::new()),
            undo: Mutex::new(VecDeque::new()),
            undo_depth,
        }
    }

    /// The underlying storage.
    pub fn service(&self) -> &Arc<dyn PersistenceService> {
        &self.service
    }

    /// Snapshot `ctx` and store it unless an equivalent checkpoint exists.
    ///
    /// The key is reserved before the write so overlapping requests for the
    /// same checkpoint cannot both proceed. A failed write releases it.
    pub async fn checkpoint(
        &self,
        ctx: &GameContext,
        save_type: SaveType,
    ) -> Result<CheckpointOutcome, PersistError> {
        let game = SavedGame::from_context(ctx, save_type);
        let key = CheckpointKey::of(&game);

        {
            let mut index = self.index.lock().await;
            if index.iter().any(|existing| key.covers(existing)) {
                tracing::debug!(session = %key.session, ?save_type, "checkpoint already recorded");
                return Ok(CheckpointOutcome::AlreadySaved);
            }
            let stored = self.service.get_all().await?;
            if stored.iter().any(|g| key.covers(&CheckpointKey::of(g))) {
                tracing::debug!(session = %key.session, ?save_type, "checkpoint already stored");
                return Ok(CheckpointOutcome::AlreadySaved);
            }
            index.insert(key);
        }

        if let Err(e) = self.service.save(&game).await {
            self.index.lock().await.remove(&key);
            return Err(e);
        }
        tracing::info!(
            session = %game.session_id,
            save = %game.id,
            ?save_type,
            "checkpoint written"
        );
        Ok(CheckpointOutcome::Saved(game))
    }

    /// Checkpoints for a session, newest first.
    pub async fn list(&self, session: SessionId) -> Result<Vec<SavedGame>, PersistError> {
        let mut games: Vec<SavedGame> = self
            .service
            .get_all()
            .await?
            .into_iter()
            .filter(|g| g.session_id == session)
            .collect();
        games.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(games)
    }

    /// The newest checkpoint for a session.
    pub async fn latest(&self, session: SessionId) -> Result<Option<SavedGame>, PersistError> {
        Ok(self.list(session).await?.into_iter().next())
    }

    /// Delete one checkpoint. The removed record can be restored with
    /// [`undo`](Self::undo).
    pub async fn delete(&self, id: SaveId) -> Result<SavedGame, PersistError> {
        let game = self
            .service
            .get_all()
            .await?
            .into_iter()
            .find(|g| g.id == id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        self.service.delete(id).await?;
        self.forget(std::slice::from_ref(&game)).await;
        self.push_undo(vec![game.clone()]).await;
        Ok(game)
    }

    /// Delete every checkpoint of a session as one undoable step.
    ///
    /// Returns the number of records removed.
    pub async fn delete_session(&self, session: SessionId) -> Result<usize, PersistError> {
        let games = self.list(session).await?;
        if games.is_empty() {
            return Ok(0);
        }
        let ids: Vec<SaveId> = games.iter().map(|g| g.id).collect();
        self.service.delete_many(&ids).await?;
        self.forget(&games).await;
        let count = games.len();
        self.push_undo(games).await;
        Ok(count)
    }

    /// Restore the most recent deletion verbatim.
    ///
    /// Returns the restored records, or an empty list if there is nothing
    /// to undo.
    pub async fn undo(&self) -> Result<Vec<SavedGame>, PersistError> {
        let Some(games) = self.undo.lock().await.pop_back() else {
            return Ok(Vec::new());
        };
        if let Err(e) = self.service.save_many(&games).await {
            self.undo.lock().await.push_back(games);
            return Err(e);
        }
        self.index
            .lock()
            .await
            .extend(games.iter().map(CheckpointKey::of));
        Ok(games)
    }

    /// Number of deletions that can currently be undone.
    pub async fn undo_len(&self) -> usize {
        self.undo.lock().await.len()
    }

    async fn forget(&self, games: &[SavedGame]) {
        let mut index = self.index.lock().await;
        for game in games {
            index.remove(&CheckpointKey::of(game));
        }
    }

    async fn push_undo(&self, games: Vec<SavedGame>) {
        if self.undo_depth == 0 {
            return;
        }
        let mut undo = self.undo.lock().await;
        undo.push_back(games);
        while undo.len() > self.undo_depth {
            undo.pop_front();
        }
    }

    /// Store a generated image.
    pub async fn record_image(
        &self,
        session: SessionId,
        kind: GalleryKind,
        prompt: &str,
        data: Vec<u8>,
    ) -> Result<GalleryItem, PersistError> {
        let item = GalleryItem::new(session, kind, prompt, data);
        self.service.save_gallery_item(&item).await?;
        Ok(item)
    }

    /// Images for a session, oldest first.
    pub async fn gallery(&self, session: SessionId) -> Result<Vec<GalleryItem>, PersistError> {
        let mut items: Vec<GalleryItem> = self
            .service
            .get_gallery()
            .await?
            .into_iter()
            .filter(|i| i.session_id == session)
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }
}
