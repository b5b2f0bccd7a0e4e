//! Post repository: the single authority between the local store and
//! the remote API
//!
//! Consumers observe the store's reactive views and issue commands
//! here. The repository is the only writer to the store apart from the
//! poller (which only inserts), and the only place raw request
//! failures are classified into [`SyncError`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::api::PostsApi;
use crate::error::SyncError;
use crate::models::Post;
use crate::poll::{DEFAULT_POLL_INTERVAL, Poller};
use crate::store::PostStore;

/// Orchestrates the local store and the remote client
pub struct PostRepository {
    api: Arc<dyn PostsApi>,
    store: Arc<PostStore>,
    poll_interval: Duration,
}

impl PostRepository {
    /// Create a repository over an API client and a store
    pub fn new(api: Arc<dyn PostsApi>, store: Arc<PostStore>) -> Self {
        Self {
            api,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval used by [`Self::newer_posts`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Watch the visible posts, newest first
    pub fn watch_visible(&self) -> watch::Receiver<Vec<Post>> {
        self.store.watch_visible()
    }

    /// Watch the hidden-post count
    pub fn watch_hidden_count(&self) -> watch::Receiver<u32> {
        self.store.watch_hidden_count()
    }

    /// Fetch every post from the server and upsert it as visible.
    ///
    /// Local rows absent from the response are left alone; a full
    /// refresh never deletes anything.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        let mut posts = self.api.fetch_all().await.map_err(SyncError::from)?;
        for post in &mut posts {
            post.hidden = false;
        }
        self.store.upsert_many(&posts).map_err(store_error)?;
        Ok(())
    }

    /// Save a post: create when it has no canonical id yet, update
    /// otherwise. The server-returned post lands in the store visible.
    ///
    /// There is no optimistic local insert; the caller tracks pending
    /// state itself until this returns.
    pub async fn save(&self, post: &Post) -> Result<Post, SyncError> {
        let result = if post.id == 0 {
            self.api.create(post).await
        } else {
            self.api.update(post).await
        };

        let mut saved = result.map_err(SyncError::from)?;
        saved.hidden = false;
        self.store.upsert(&saved).map_err(store_error)?;
        Ok(saved)
    }

    /// Remove a post, optimistically.
    ///
    /// The local row is deleted before the server confirms and is NOT
    /// restored when the remote delete fails. This asymmetry with
    /// [`Self::like_by_id`]'s rollback is deliberate and pinned by
    /// tests.
    pub async fn remove_by_id(&self, id: i64) -> Result<(), SyncError> {
        self.store.delete_by_id(id).map_err(store_error)?;
        self.api.delete(id).await.map_err(SyncError::from)?;
        Ok(())
    }

    /// Toggle the like state of a post, optimistically with rollback.
    ///
    /// The flipped row is written locally before the remote call; on
    /// any remote failure the pre-flip row is restored and the error is
    /// classified. A missing row is a no-op.
    ///
    /// Concurrent calls for the same id are not serialized: the local
    /// writes race last-write-wins and both remote calls may fire.
    pub async fn like_by_id(&self, id: i64) -> Result<(), SyncError> {
        let Some(original) = self.store.get_by_id(id).map_err(store_error)? else {
            return Ok(());
        };

        let mut flipped = original.clone();
        flipped.liked_by_me = !original.liked_by_me;
        flipped.likes = if original.liked_by_me {
            original.likes.saturating_sub(1)
        } else {
            original.likes.saturating_add(1)
        };
        self.store.upsert(&flipped).map_err(store_error)?;

        let confirm = if flipped.liked_by_me {
            self.api.like(id).await
        } else {
            self.api.unlike(id).await
        };

        match confirm {
            Ok(()) => Ok(()),
            Err(err) => {
                // Best-effort rollback: a failure here is logged, and
                // the remote error is what the caller sees
                if let Err(rollback) = self.store.upsert(&original) {
                    tracing::error!("failed to roll back like on post {id}: {rollback:#}");
                }
                Err(err.into())
            }
        }
    }

    /// Start polling for posts newer than the latest known id.
    ///
    /// Each emitted value is the count of newly discovered posts, all
    /// already inserted hidden. The stream is infinite and
    /// per-subscription; dropping the receiver cancels the poller.
    pub fn newer_posts(&self, since_id: i64) -> mpsc::Receiver<usize> {
        Poller::new(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            self.poll_interval,
        )
        .spawn(since_id)
    }

    /// Make every hidden post visible. Fails soft: a store error is
    /// logged, never raised.
    pub fn show_all_hidden(&self) {
        if let Err(e) = self.store.reveal_all() {
            tracing::warn!("failed to reveal hidden posts: {e:#}");
        }
    }

    /// Latest known post id, or `None` for an empty (or failing) store
    pub fn latest_id(&self) -> Option<i64> {
        match self.store.latest_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("failed to read latest id: {e:#}");
                None
            }
        }
    }
}

fn store_error(err: anyhow::Error) -> SyncError {
    tracing::error!("store failure: {err:#}");
    SyncError::Unknown
}
