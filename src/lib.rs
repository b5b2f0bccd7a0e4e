//! # Roost 🪺
//!
//! A local-first sync engine for a social feed.
//!
//! ## Overview
//!
//! Roost keeps a persisted copy of a remote feed in `SQLite` and
//! reconciles it with the server under optimistic-update semantics:
//! likes flip locally before the server confirms (and roll back on
//! failure), removals are fire-and-forget, and a background poller
//! discovers newly published posts, parking them hidden until the
//! consumer reveals them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PostRepository                        │
//! │   Sole authority between local state and remote truth:      │
//! │   refresh, save, optimistic like/remove, reveal, polling    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    PostStore    │ │    PostsApi     │ │     Poller      │
//! │                 │ │                 │ │                 │
//! │ • SQLite table  │ │ • fetch/save    │ │ • fetch-newer   │
//! │ • visible view  │ │ • like/unlike   │ │   loop (10s)    │
//! │ • hidden count  │ │ • delete        │ │ • inserts hidden│
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! Consumers observe two reactive channels (visible posts, hidden
//! count) and a per-subscription stream of newly-discovered counts; all
//! three replay or restart cleanly for new subscribers.
//!
//! ## Modules
//!
//! - [`api`] — remote feed client (`PostsApi` trait + reqwest impl)
//! - [`config`] — configuration management
//! - [`error`] — the Network/Api/Unknown error taxonomy
//! - [`models`] — data models (Post, Attachment)
//! - [`poll`] — background poller for new posts
//! - [`repo`] — the repository core
//! - [`session`] — encrypted persisted session identity
//! - [`store`] — `SQLite` post store with reactive views

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::should_implement_trait)]

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod paths;
pub mod poll;
pub mod repo;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use api::{ApiClient, AuthResponse, PostsApi};
pub use config::Config;
pub use error::{RequestError, SyncError};
pub use models::{Attachment, AttachmentKind, Post};
pub use poll::Poller;
pub use repo::PostRepository;
pub use session::{Session, SessionStore};
pub use store::PostStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
