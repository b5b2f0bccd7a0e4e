//! Background poller for newly published posts
//!
//! One poller per subscription: it wakes on a fixed interval, asks the
//! server for posts newer than the latest locally known id, inserts the
//! genuinely new ones as hidden, and emits how many it found. Errors
//! inside an iteration are logged and swallowed; the loop only ends
//! when the subscriber goes away.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

use crate::api::PostsApi;
use crate::store::PostStore;

/// Pause between poll iterations unless overridden
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic fetch-newer loop feeding the local store
pub struct Poller {
    api: Arc<dyn PostsApi>,
    store: Arc<PostStore>,
    interval: Duration,
}

impl Poller {
    /// Create a poller over the given API client and store
    pub fn new(api: Arc<dyn PostsApi>, store: Arc<PostStore>, interval: Duration) -> Self {
        Self {
            api,
            store,
            interval,
        }
    }

    /// Start polling; `since_id` is the fallback lower bound while the
    /// store is empty.
    ///
    /// Returns the stream of newly-discovered counts. Dropping the
    /// receiver stops the loop, releasing a pending wait immediately; a
    /// fresh spawn restarts from the store's current latest id.
    pub fn spawn(self, since_id: i64) -> mpsc::Receiver<usize> {
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    () = time::sleep(self.interval) => {}
                }

                if let Err(e) = self.poll_once(since_id, &tx).await {
                    tracing::warn!("poll iteration failed: {e:#}");
                }
            }
            tracing::debug!("poller stopped");
        });

        rx
    }

    /// One iteration: fetch, filter out already-known ids, insert the
    /// rest hidden, emit the count
    async fn poll_once(&self, since_id: i64, tx: &mpsc::Sender<usize>) -> Result<()> {
        let latest = self.store.latest_id()?.unwrap_or(since_id);
        let fetched = self.api.fetch_newer_than(latest).await?;

        let mut fresh = Vec::new();
        for mut post in fetched {
            if self.store.exists(post.id)? {
                continue;
            }
            post.hidden = true;
            fresh.push(post);
        }

        if !fresh.is_empty() {
            self.store.upsert_many(&fresh)?;
            let _ = tx.send(fresh.len()).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::models::Post;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves one page of "newer" posts, then empty pages forever
    struct OnePageApi {
        page: Mutex<Option<Vec<Post>>>,
        asked_after: Mutex<Vec<i64>>,
    }

    impl OnePageApi {
        fn new(page: Vec<Post>) -> Self {
            Self {
                page: Mutex::new(Some(page)),
                asked_after: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PostsApi for OnePageApi {
        async fn fetch_all(&self) -> Result<Vec<Post>, RequestError> {
            Ok(Vec::new())
        }

        async fn fetch_newer_than(&self, id: i64) -> Result<Vec<Post>, RequestError> {
            self.asked_after.lock().unwrap().push(id);
            Ok(self.page.lock().unwrap().take().unwrap_or_default())
        }

        async fn create(&self, post: &Post) -> Result<Post, RequestError> {
            Ok(post.clone())
        }

        async fn update(&self, post: &Post) -> Result<Post, RequestError> {
            Ok(post.clone())
        }

        async fn delete(&self, _id: i64) -> Result<(), RequestError> {
            Ok(())
        }

        async fn like(&self, _id: i64) -> Result<(), RequestError> {
            Ok(())
        }

        async fn unlike(&self, _id: i64) -> Result<(), RequestError> {
            Ok(())
        }
    }

    fn post(id: i64) -> Post {
        Post {
            id,
            author: "ada".to_string(),
            author_id: 1,
            author_avatar: String::new(),
            content: format!("post {id}"),
            published: "1700000000".to_string(),
            likes: 0,
            liked_by_me: false,
            attachment: None,
            hidden: false,
        }
    }

    #[tokio::test]
    async fn already_known_ids_are_filtered_out() {
        let api = Arc::new(OnePageApi::new(vec![post(101), post(102)]));
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        store.upsert(&post(101)).unwrap();

        let poller = Poller::new(
            api.clone() as Arc<dyn PostsApi>,
            store.clone(),
            Duration::from_millis(10),
        );
        let mut rx = poller.spawn(0);

        let count = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poller never emitted")
            .expect("channel closed");

        assert_eq!(count, 1);
        assert!(store.get_by_id(102).unwrap().unwrap().hidden);
        // 101 was already visible; it must not be re-hidden
        assert!(!store.get_by_id(101).unwrap().unwrap().hidden);
    }

    #[tokio::test]
    async fn lower_bound_falls_back_to_since_id_on_an_empty_store() {
        let api = Arc::new(OnePageApi::new(Vec::new()));
        let store = Arc::new(PostStore::open_in_memory().unwrap());

        let poller = Poller::new(
            api.clone() as Arc<dyn PostsApi>,
            store,
            Duration::from_millis(10),
        );
        let rx = poller.spawn(42);

        time::sleep(Duration::from_millis(100)).await;
        drop(rx);

        let asked = api.asked_after.lock().unwrap().clone();
        assert!(!asked.is_empty());
        assert_eq!(asked[0], 42);
    }

    #[tokio::test]
    async fn dropping_the_receiver_stops_the_loop() {
        let api = Arc::new(OnePageApi::new(Vec::new()));
        let store = Arc::new(PostStore::open_in_memory().unwrap());

        let poller = Poller::new(
            api.clone() as Arc<dyn PostsApi>,
            store,
            Duration::from_millis(10),
        );
        let rx = poller.spawn(0);

        time::sleep(Duration::from_millis(50)).await;
        drop(rx);
        time::sleep(Duration::from_millis(50)).await;

        let polls_after_drop = api.asked_after.lock().unwrap().len();
        time::sleep(Duration::from_millis(100)).await;

        // At most one in-flight iteration may finish after the drop
        assert!(api.asked_after.lock().unwrap().len() <= polls_after_drop + 1);
    }

    #[tokio::test]
    async fn no_emission_when_nothing_is_new() {
        let api = Arc::new(OnePageApi::new(vec![post(5)]));
        let store = Arc::new(PostStore::open_in_memory().unwrap());
        store.upsert(&post(5)).unwrap();

        let poller = Poller::new(api as Arc<dyn PostsApi>, store.clone(), Duration::from_millis(10));
        let mut rx = poller.spawn(0);

        let emitted = time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(emitted.is_err(), "nothing new should mean no emission");
        assert_eq!(store.hidden_count(), 0);
    }
}
