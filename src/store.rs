//! Persistent cache contract and the in-memory implementation.
//!
//! The engine only uses the store to warm-start its page cache: fetched
//! pages are written as JSON under `page:<pointer>` and read back before the
//! provider is asked again.  The store is never the source of truth, so a
//! missing or unreadable entry just means a network fetch.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use lru::LruCache;

use crate::source::{Page, PagePointer};

/// A size-bounded key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);
}

/// An in-process store that evicts the least recently used entry when full.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<LruCache<String, String>>,
}

impl MemoryStore {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        let displaced = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string(), value);
        match displaced {
            Some((evicted, _)) if evicted != key => debug!("store full, evicted {evicted}"),
            _ => {}
        }
    }
}

fn page_key(pointer: &PagePointer) -> String {
    format!("page:{pointer}")
}

/// Read a previously stored page.
pub fn load_page(store: &dyn KeyValueStore, pointer: &PagePointer) -> Option<Page> {
    let raw = store.get(&page_key(pointer))?;
    match serde_json::from_str(&raw) {
        Ok(page) => Some(page),
        Err(e) => {
            warn!("ignoring unreadable stored page {pointer}: {e}");
            None
        }
    }
}

pub fn save_page(store: &dyn KeyValueStore, pointer: &PagePointer, page: &Page) {
    match serde_json::to_string(page) {
        Ok(raw) => store.set(&page_key(pointer), raw),
        Err(e) => warn!("could not store page {pointer}: {e}"),
    }
}
