//! Data models

mod post;

pub use post::{Attachment, AttachmentKind, Post};
