//! Errors surfaced by the feed engine.
//!
//! Provider implementations and the binary work with [`anyhow::Result`];
//! everything the engine hands back to callers is a [`FeedError`].  The type
//! is `Clone` so that snapshots can carry the errors a feed accumulated.

use thiserror::Error;

use crate::source::SourceAddress;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("unknown sort type: {0}")]
    UnknownSort(String),

    #[error("invalid feed spec: {0}")]
    InvalidSpec(String),

    #[error("no feed named {0:?}")]
    UnknownFeed(String),

    #[error("a pending item by {author} at {timestamp} already exists")]
    DuplicatePending { author: String, timestamp: i64 },

    #[error("invalid publication: {0}")]
    InvalidPublication(String),

    #[error("fetching {address} failed: {message}")]
    Fetch {
        address: SourceAddress,
        message: String,
    },

    #[error("publishing failed: {message}")]
    Publish { message: String },
}
