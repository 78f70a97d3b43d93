//! Index of every confirmed item seen in any fetched page.
//!
//! Keyed by cid, with a second map by `(author, timestamp)` so a pending
//! publication can find its confirmation.  `updated_at` decides freshness:
//! only a strictly newer copy replaces the indexed one.

use std::collections::HashMap;

use crate::source::{Cid, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// First time this cid is seen.
    New,
    /// A strictly newer `updated_at` than the indexed copy.
    Updated,
    /// Same or older state; nothing to do.
    Stale,
}

#[derive(Debug, Default)]
pub struct ItemIndex {
    items: HashMap<Cid, Item>,
    by_local_key: HashMap<(String, i64), Cid>,
    revision: u64,
}

impl ItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item from a fetched page.  Items without a cid are ignored
    /// and reported stale.
    pub fn observe(&mut self, item: &Item) -> Freshness {
        let Some(cid) = &item.cid else {
            return Freshness::Stale;
        };

        let freshness = match self.items.get(cid) {
            None => Freshness::New,
            Some(known) if item.updated_at > known.updated_at => Freshness::Updated,
            Some(_) => Freshness::Stale,
        };
        if freshness == Freshness::Stale {
            return freshness;
        }

        let mut stored = item.clone();
        stored.pending = false;
        self.by_local_key.insert(item.local_key(), cid.clone());
        self.items.insert(cid.clone(), stored);
        self.revision += 1;
        freshness
    }

    pub fn get(&self, cid: &Cid) -> Option<&Item> {
        self.items.get(cid)
    }

    /// The confirmed item authored by `author` at `timestamp`, if seen.
    pub fn confirmed(&self, author: &str, timestamp: i64) -> Option<&Item> {
        self.by_local_key
            .get(&(author.to_string(), timestamp))
            .and_then(|cid| self.items.get(cid))
    }

    /// The indexed copy when it is newer than `item`.
    pub fn fresher(&self, item: &Item) -> Option<&Item> {
        let cid = item.cid.as_ref()?;
        self.items
            .get(cid)
            .filter(|known| known.updated_at > item.updated_at)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
