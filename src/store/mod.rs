//! Local post store: `SQLite` table plus reactive views
//!
//! One row per post id, with a local-only `hidden` flag. Two watch
//! channels expose the derived views (visible posts, hidden count);
//! every mutation re-emits both, and new subscribers replay the current
//! snapshot.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::models::{Attachment, AttachmentKind, Post};
use crate::paths;

/// Post store backed by a single `SQLite` connection
pub struct PostStore {
    conn: Mutex<Connection>,
    visible_tx: watch::Sender<Vec<Post>>,
    hidden_tx: watch::Sender<u32>,
}

impl PostStore {
    /// Open or create the store at the default location
    pub fn open() -> Result<Self> {
        let path = paths::database_path()?;
        Self::open_path(&path)
    }

    /// Open or create the store at a specific path
    pub fn open_path(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::init(&conn)?;

        let visible = Self::query_visible(&conn)?;
        let hidden = Self::query_hidden_count(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            visible_tx: watch::Sender::new(visible),
            hidden_tx: watch::Sender::new(hidden),
        })
    }

    /// Open an in-memory store (tests, throwaway sessions)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open database")?;
        Self::init(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            visible_tx: watch::Sender::new(Vec::new()),
            hidden_tx: watch::Sender::new(0),
        })
    }

    /// Initialize the database schema
    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                author TEXT NOT NULL,
                author_id INTEGER NOT NULL DEFAULT 0,
                author_avatar TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                published TEXT NOT NULL DEFAULT '',
                likes INTEGER NOT NULL DEFAULT 0,
                liked_by_me INTEGER NOT NULL DEFAULT 0,
                attachment_url TEXT,
                attachment_type TEXT,
                hidden INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_posts_hidden ON posts(hidden);
            ",
        )?;

        Ok(())
    }

    /// Watch the visible posts (hidden = false), newest id first.
    ///
    /// The receiver starts with the current snapshot and is re-notified
    /// on every store mutation.
    pub fn watch_visible(&self) -> watch::Receiver<Vec<Post>> {
        self.visible_tx.subscribe()
    }

    /// Watch the count of hidden posts
    pub fn watch_hidden_count(&self) -> watch::Receiver<u32> {
        self.hidden_tx.subscribe()
    }

    /// Current visible posts snapshot
    pub fn visible(&self) -> Vec<Post> {
        self.visible_tx.borrow().clone()
    }

    /// Current hidden-post count
    pub fn hidden_count(&self) -> u32 {
        *self.hidden_tx.borrow()
    }

    /// Insert or replace a post by id
    pub fn upsert(&self, post: &Post) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store mutex poisoned");
            Self::upsert_row(&conn, post)?;
        }
        self.notify()
    }

    /// Insert or replace many posts in one transaction
    pub fn upsert_many(&self, posts: &[Post]) -> Result<()> {
        {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            let tx = conn.transaction()?;
            for post in posts {
                Self::upsert_row(&tx, post)?;
            }
            tx.commit()?;
        }
        self.notify()
    }

    /// Get a post by id
    pub fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, author, author_id, author_avatar, content, published,
                    likes, liked_by_me, attachment_url, attachment_type, hidden
             FROM posts WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], Self::row_to_post);
        match result {
            Ok(post) => Ok(Some(post)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a post by id
    pub fn delete_by_id(&self, id: i64) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store mutex poisoned");
            conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        }
        self.notify()
    }

    /// Max id across all rows, hidden or not; `None` for an empty table
    pub fn latest_id(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM posts", [], |row| row.get(0))?;
        Ok(max)
    }

    /// Whether a row with this id exists
    pub fn exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }

    /// Make every hidden post visible, in one statement
    pub fn reveal_all(&self) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store mutex poisoned");
            conn.execute("UPDATE posts SET hidden = 0 WHERE hidden = 1", [])?;
        }
        self.notify()
    }

    /// Re-query derived views and publish them to watchers
    fn notify(&self) -> Result<()> {
        let (visible, hidden) = {
            let conn = self.conn.lock().expect("store mutex poisoned");
            (Self::query_visible(&conn)?, Self::query_hidden_count(&conn)?)
        };
        self.visible_tx.send_replace(visible);
        self.hidden_tx.send_replace(hidden);
        Ok(())
    }

    fn upsert_row(conn: &Connection, post: &Post) -> Result<()> {
        conn.execute(
            r"INSERT OR REPLACE INTO posts
               (id, author, author_id, author_avatar, content, published,
                likes, liked_by_me, attachment_url, attachment_type, hidden)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                post.id,
                post.author,
                post.author_id,
                post.author_avatar,
                post.content,
                post.published,
                post.likes,
                i32::from(post.liked_by_me),
                post.attachment.as_ref().map(|a| a.url.as_str()),
                post.attachment.as_ref().map(|a| a.kind.as_str()),
                i32::from(post.hidden),
            ],
        )?;
        Ok(())
    }

    fn query_visible(conn: &Connection) -> Result<Vec<Post>> {
        let mut stmt = conn.prepare(
            "SELECT id, author, author_id, author_avatar, content, published,
                    likes, liked_by_me, attachment_url, attachment_type, hidden
             FROM posts WHERE hidden = 0 ORDER BY id DESC",
        )?;

        let posts = stmt.query_map([], Self::row_to_post)?;
        posts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn query_hidden_count(conn: &Connection) -> Result<u32> {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE hidden = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Helper to convert a row to `Post`
    fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
        let attachment_url: Option<String> = row.get(8)?;
        let attachment_type: Option<String> = row.get(9)?;
        let attachment = match (attachment_url, attachment_type) {
            (Some(url), Some(kind)) => {
                AttachmentKind::from_str(&kind).map(|kind| Attachment { url, kind })
            }
            _ => None,
        };

        Ok(Post {
            id: row.get(0)?,
            author: row.get(1)?,
            author_id: row.get(2)?,
            author_avatar: row.get(3)?,
            content: row.get(4)?,
            published: row.get(5)?,
            likes: row.get(6)?,
            liked_by_me: row.get::<_, i32>(7)? != 0,
            attachment,
            hidden: row.get::<_, i32>(10)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

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

    fn hidden_post(id: i64) -> Post {
        Post {
            hidden: true,
            ..post(id)
        }
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sqlite");

        {
            let store = PostStore::open_path(&path).unwrap();
            store.upsert(&post(1)).unwrap();
            store.upsert(&hidden_post(2)).unwrap();
        }

        let store = PostStore::open_path(&path).unwrap();
        assert_eq!(store.visible().len(), 1);
        assert_eq!(store.hidden_count(), 1);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = PostStore::open_in_memory().unwrap();
        store.upsert(&post(1)).unwrap();

        let mut edited = post(1);
        edited.content = "edited".to_string();
        store.upsert(&edited).unwrap();

        let visible = store.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "edited");
    }

    #[test]
    fn visible_is_ordered_by_id_desc_and_excludes_hidden() {
        let store = PostStore::open_in_memory().unwrap();
        store
            .upsert_many(&[post(1), post(3), hidden_post(2)])
            .unwrap();

        let ids: Vec<i64> = store.visible().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(store.hidden_count(), 1);
    }

    #[test]
    fn latest_id_counts_hidden_rows_too() {
        let store = PostStore::open_in_memory().unwrap();
        assert_eq!(store.latest_id().unwrap(), None);

        store.upsert(&post(3)).unwrap();
        store.upsert(&hidden_post(9)).unwrap();
        assert_eq!(store.latest_id().unwrap(), Some(9));
    }

    #[test]
    fn exists_and_delete() {
        let store = PostStore::open_in_memory().unwrap();
        store.upsert(&post(5)).unwrap();

        assert!(store.exists(5).unwrap());
        assert!(!store.exists(6).unwrap());

        store.delete_by_id(5).unwrap();
        assert!(!store.exists(5).unwrap());
        assert!(store.get_by_id(5).unwrap().is_none());
    }

    #[test]
    fn reveal_all_moves_every_hidden_row_exactly_once() {
        let store = PostStore::open_in_memory().unwrap();
        store
            .upsert_many(&[post(1), hidden_post(2), hidden_post(3)])
            .unwrap();
        assert_eq!(store.hidden_count(), 2);

        store.reveal_all().unwrap();

        assert_eq!(store.hidden_count(), 0);
        let ids: Vec<i64> = store.visible().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn attachment_round_trips_through_the_table() {
        let store = PostStore::open_in_memory().unwrap();
        let mut with_media = post(1);
        with_media.attachment = Some(Attachment {
            url: "pic.png".to_string(),
            kind: AttachmentKind::Image,
        });
        store.upsert(&with_media).unwrap();

        let loaded = store.get_by_id(1).unwrap().unwrap();
        assert_eq!(loaded, with_media);
    }

    #[tokio::test]
    async fn watchers_replay_snapshot_then_see_updates() {
        let store = PostStore::open_in_memory().unwrap();
        store.upsert(&post(1)).unwrap();

        // New subscriber gets the current snapshot
        let mut visible_rx = store.watch_visible();
        assert_eq!(visible_rx.borrow().len(), 1);

        let mut hidden_rx = store.watch_hidden_count();
        assert_eq!(*hidden_rx.borrow(), 0);

        store.upsert(&hidden_post(2)).unwrap();

        visible_rx.changed().await.unwrap();
        assert_eq!(visible_rx.borrow_and_update().len(), 1);
        hidden_rx.changed().await.unwrap();
        assert_eq!(*hidden_rx.borrow_and_update(), 1);
    }
}
