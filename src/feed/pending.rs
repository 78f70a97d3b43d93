//! Locally-published items waiting for the network to confirm them.
//!
//! A pending item has no cid, so it is keyed by `(author, timestamp)`.  It
//! shows up in every feed covering its source right away.  When a fetched
//! page carries an item with the same author and timestamp, the entry is
//! marked confirmed and the remote copy takes its place.
//!
//! Unconfirmed entries are kept indefinitely.  Confirmed entries only carry
//! the item into feeds whose own chains have not listed it yet, and the
//! oldest are retired once more than [`MAX_CONFIRMED_ENTRIES`] pile up.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{FeedError, FeedResult};
use crate::source::{Cid, Item, SourceAddress};

/// Confirmed entries kept before the oldest confirmation is retired.
pub const MAX_CONFIRMED_ENTRIES: usize = 256;

type LocalKey = (String, i64);

#[derive(Debug, Clone)]
struct PendingEntry {
    /// The local copy; `cid` is filled in once publication is verified.
    local: Item,
    /// The remote copy, once seen in a fetched page.
    confirmed: Option<Item>,
}

impl PendingEntry {
    /// What a feed should show for this entry.
    fn current(&self) -> Item {
        self.confirmed.clone().unwrap_or_else(|| self.local.clone())
    }
}

#[derive(Debug, Default)]
pub struct PendingStore {
    entries: BTreeMap<LocalKey, PendingEntry>,
    /// Confirmed keys, oldest confirmation first.
    confirmed_order: VecDeque<LocalKey>,
    version: u64,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut item: Item) -> FeedResult<()> {
        if let Some(cid) = &item.cid {
            return Err(FeedError::InvalidPublication(format!(
                "item already has cid {cid}"
            )));
        }
        let key = item.local_key();
        if self.entries.contains_key(&key) {
            return Err(FeedError::DuplicatePending {
                author: item.author_address,
                timestamp: item.timestamp,
            });
        }
        item.pending = true;
        self.entries.insert(
            key,
            PendingEntry {
                local: item,
                confirmed: None,
            },
        );
        self.version += 1;
        Ok(())
    }

    fn find(&self, author: &str, timestamp: i64) -> Option<&PendingEntry> {
        self.entries.get(&(author.to_string(), timestamp))
    }

    fn find_mut(&mut self, author: &str, timestamp: i64) -> Option<&mut PendingEntry> {
        self.entries.get_mut(&(author.to_string(), timestamp))
    }

    /// Record the cid a verified publication received.  A cid is assigned
    /// once; returns the item's source when this call changed anything.
    pub fn assign_cid(&mut self, author: &str, timestamp: i64, cid: Cid) -> Option<SourceAddress> {
        let entry = self.find_mut(author, timestamp)?;
        if entry.local.cid.is_some() || entry.confirmed.is_some() {
            return None;
        }
        entry.local.cid = Some(cid);
        let source = entry.local.source.clone();
        self.version += 1;
        Some(source)
    }

    /// Match freshly fetched items against pending entries.  Returns the
    /// sources of the entries that became confirmed.
    pub fn reconcile(&mut self, items: &[Item]) -> Vec<SourceAddress> {
        let mut confirmed_sources = Vec::new();
        for item in items.iter().filter(|i| i.cid.is_some()) {
            let key = item.local_key();
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if entry.confirmed.is_some() {
                continue;
            }
            let mut remote = item.clone();
            remote.pending = false;
            entry.confirmed = Some(remote);
            confirmed_sources.push(entry.local.source.clone());
            self.confirmed_order.push_back(key);
        }
        if !confirmed_sources.is_empty() {
            self.retire_oldest_confirmed();
            self.version += 1;
        }
        confirmed_sources
    }

    fn retire_oldest_confirmed(&mut self) {
        while self.confirmed_order.len() > MAX_CONFIRMED_ENTRIES {
            if let Some(key) = self.confirmed_order.pop_front() {
                self.entries.remove(&key);
            }
        }
    }

    /// Items to merge into a feed over `sources`.  Confirmed entries carry
    /// the copy seen at confirmation; callers holding a fresher index should
    /// prefer it.
    pub fn candidates(&self, sources: &[SourceAddress]) -> Vec<Item> {
        self.entries
            .values()
            .filter(|e| sources.contains(&e.local.source))
            .map(PendingEntry::current)
            .collect()
    }

    /// Latest copy of the entry authored by `author` at `timestamp`.
    pub fn get(&self, author: &str, timestamp: i64) -> Option<Item> {
        self.find(author, timestamp).map(PendingEntry::current)
    }

    pub fn is_pending(&self, author: &str, timestamp: i64) -> bool {
        self.find(author, timestamp)
            .is_some_and(|e| e.confirmed.is_none())
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len() - self.confirmed_order.len()
    }

    /// Entries held, confirmed or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
