//! Post model shared by the local store and the remote API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed post.
///
/// The same shape is stored locally and exchanged with the remote API,
/// with one exception: `hidden` is a local-only projection and never
/// crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Server-assigned id; `0` means the post has not been persisted
    /// remotely yet
    pub id: i64,
    /// Author display name
    pub author: String,
    /// Author id on the server
    #[serde(default)]
    pub author_id: i64,
    /// Author avatar reference (relative to the server's media root)
    #[serde(default)]
    pub author_avatar: String,
    /// Post text
    pub content: String,
    /// Publication timestamp as the server formats it (epoch seconds)
    #[serde(default)]
    pub published: String,
    /// Number of likes
    #[serde(default)]
    pub likes: u32,
    /// Whether the current user has liked this post
    #[serde(default)]
    pub liked_by_me: bool,
    /// Optional media attachment
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Present locally but excluded from the visible view until revealed.
    /// Never serialized: the remote API knows nothing about it.
    #[serde(skip)]
    pub hidden: bool,
}

/// Media attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Media URL (relative to the server's media root)
    pub url: String,
    /// Attachment kind
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
}

/// Attachment kind, uppercase on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachmentKind {
    /// Image (JPEG, PNG, WebP)
    Image,
    /// Video
    Video,
    /// Audio
    Audio,
}

impl AttachmentKind {
    /// Wire name of the kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Audio => "AUDIO",
        }
    }

    /// Parse from the wire name
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IMAGE" => Some(Self::Image),
            "VIDEO" => Some(Self::Video),
            "AUDIO" => Some(Self::Audio),
            _ => None,
        }
    }
}

impl Post {
    /// Create a new, not-yet-persisted post (id 0) with the given content
    pub fn draft(content: &str) -> Self {
        Self {
            id: 0,
            author: String::new(),
            author_id: 0,
            author_avatar: String::new(),
            content: content.to_string(),
            published: String::new(),
            likes: 0,
            liked_by_me: false,
            attachment: None,
            hidden: false,
        }
    }

    /// Whether the post belongs to the given user id
    pub fn owned_by(&self, user_id: i64) -> bool {
        self.author_id == user_id
    }

    /// Parse the server's epoch-seconds `published` stamp
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.published.parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }

    /// Get a short preview of the content (for list display).
    ///
    /// Truncation counts characters, not bytes, so multibyte content
    /// is cut on a char boundary.
    pub fn preview(&self, max_len: usize) -> String {
        let content = self.content.replace('\n', " ");
        if content.chars().count() <= max_len {
            content
        } else {
            let cut: String = content.chars().take(max_len.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        let Some(published) = self.published_at() else {
            return String::new();
        };
        let duration = Utc::now().signed_duration_since(published);

        if duration.num_seconds() < 60 {
            format!("{}s", duration.num_seconds())
        } else if duration.num_minutes() < 60 {
            format!("{}m", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h", duration.num_hours())
        } else if duration.num_days() < 7 {
            format!("{}d", duration.num_days())
        } else {
            published.format("%b %d").to_string()
        }
    }
}
