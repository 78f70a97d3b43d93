//! The core data types shared by every content provider and the feed engine.
//!
//! `Item` represents a single post or reply from any source.  Every provider
//! converts its native records into `Item`s grouped in [`Page`]s, so the rest
//! of the engine (chaining, de-duplication, sorting, reconciliation) can stay
//! provider-agnostic.
//!
//! ## For contributors
//!
//! If you are adding a new provider you do **not** need to modify this file
//! unless your source requires extra fields.  Just construct `Item` values in
//! your provider's `fetch_page()` implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a content collection (a community, a reply thread, an RSS URL).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceAddress(pub String);

impl SourceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content identifier assigned by the network once an item is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(pub String);

impl Cid {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single page in a source's page chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PagePointer(pub String);

impl PagePointer {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self(pointer.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PagePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single content record, normalised from any provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Network identifier.  `None` for a locally-authored item the network
    /// has not confirmed yet; assigned exactly once and never changed.
    pub cid: Option<Cid>,

    /// The source this item was published to.
    pub source: SourceAddress,

    /// Address of the author.  Together with `timestamp` it identifies a
    /// pending item before it has a cid.
    pub author_address: String,

    /// Authored-at, Unix seconds.  Immutable.
    pub timestamp: i64,

    /// Last refresh of the mutable state (votes, replies), Unix seconds.
    /// Non-decreasing per cid.
    #[serde(default)]
    pub updated_at: Option<i64>,

    #[serde(default)]
    pub upvote_count: u64,

    #[serde(default)]
    pub downvote_count: u64,

    #[serde(default)]
    pub reply_count: u64,

    /// Pinned by the source's moderators.  Only meaningful inside the source.
    #[serde(default)]
    pub pinned: bool,

    pub title: Option<String>,

    pub content: Option<String>,

    pub link: Option<String>,

    /// Set while the item is a local publication awaiting confirmation.
    #[serde(skip)]
    pub pending: bool,
}

impl Item {
    /// Identity used for de-duplication inside a feed.
    pub fn key(&self) -> ItemKey {
        match &self.cid {
            Some(cid) => ItemKey::Confirmed(cid.clone()),
            None => ItemKey::Local {
                author: self.author_address.clone(),
                timestamp: self.timestamp,
            },
        }
    }

    /// The `(author, timestamp)` pair a pending item is matched by.
    pub fn local_key(&self) -> (String, i64) {
        (self.author_address.clone(), self.timestamp)
    }

    /// Upvotes minus downvotes.
    pub fn score(&self) -> i64 {
        self.upvote_count as i64 - self.downvote_count as i64
    }
}

/// Identity of an item within a feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKey {
    Confirmed(Cid),
    Local { author: String, timestamp: i64 },
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Confirmed(cid) => write!(f, "{cid}"),
            ItemKey::Local { author, timestamp } => write!(f, "local:{author}:{timestamp}"),
        }
    }
}

/// One batch of items plus the pointer to the next batch.
///
/// Pages are immutable once fetched.  All items are expected to belong to
/// the same source; the aggregator drops the ones that don't.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_page: Option<PagePointer>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
