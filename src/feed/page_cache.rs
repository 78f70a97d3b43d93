//! Fetched pages and the chains they form.
//!
//! Pages are stored by pointer and linked through their `next_page`.  A
//! chain for `(source, sort)` starts at the first-page pointer the provider
//! reported and runs until a page is missing from the cache.  A truncated
//! chain is normal: it just means the next page has not arrived yet.
//!
//! The cache also owns the in-flight guard that keeps two feeds sharing a
//! source from fetching the same page twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::warn;

use super::SortType;
use crate::source::{Page, PagePointer, SourceAddress};

/// One page chain: a source listed by one sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub source: SourceAddress,
    pub sort: SortType,
}

impl ChainKey {
    pub fn new(source: SourceAddress, sort: SortType) -> Self {
        Self { source, sort }
    }
}

/// What the in-flight guard de-duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchTarget {
    FirstPointer(ChainKey),
    Page(PagePointer),
}

/// The next step to grow a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextFetch {
    /// Ask the provider where the chain starts.
    FirstPointer,
    /// Fetch this page.
    Page(PagePointer),
    /// Nothing left: the source lists nothing, or the last page has no next.
    Exhausted,
}

/// Cheap summary of a chain, compared by the recompute pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChainSignature {
    pub pages: usize,
    pub exhausted: bool,
}

#[derive(Debug, Default)]
pub struct PageCache {
    /// `None` once the provider said the chain is empty.
    first_pointers: HashMap<ChainKey, Option<PagePointer>>,
    pages: HashMap<PagePointer, Arc<Page>>,
    in_flight: HashSet<(String, FetchTarget)>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cached pages of a chain, in link order.
    pub fn chain(&self, key: &ChainKey) -> Vec<Arc<Page>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.first_pointers.get(key).and_then(Option::as_ref);

        while let Some(pointer) = next {
            if !seen.insert(pointer) {
                warn!("page chain for {} loops back to {pointer}", key.source);
                break;
            }
            let Some(page) = self.pages.get(pointer) else {
                break;
            };
            chain.push(Arc::clone(page));
            next = page.next_page.as_ref();
        }
        chain
    }

    pub fn next_fetch(&self, key: &ChainKey) -> NextFetch {
        let mut pointer = match self.first_pointers.get(key) {
            None => return NextFetch::FirstPointer,
            Some(None) => return NextFetch::Exhausted,
            Some(Some(first)) => first,
        };
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(pointer) {
                return NextFetch::Exhausted;
            }
            match self.pages.get(pointer) {
                None => return NextFetch::Page(pointer.clone()),
                Some(page) => match &page.next_page {
                    None => return NextFetch::Exhausted,
                    Some(next) => pointer = next,
                },
            }
        }
    }

    pub fn is_exhausted(&self, key: &ChainKey) -> bool {
        self.next_fetch(key) == NextFetch::Exhausted
    }

    pub fn signature(&self, key: &ChainKey) -> ChainSignature {
        ChainSignature {
            pages: self.chain(key).len(),
            exhausted: self.is_exhausted(key),
        }
    }

    /// Record where a chain starts.  Returns whether anything changed.
    pub fn set_first_pointer(&mut self, key: ChainKey, pointer: Option<PagePointer>) -> bool {
        match self.first_pointers.get(&key) {
            Some(existing) if *existing == pointer => false,
            _ => {
                self.first_pointers.insert(key, pointer);
                true
            }
        }
    }

    /// Add a successfully fetched page.  Pages are immutable: a pointer that
    /// is already cached keeps its page and `false` is returned.
    pub fn insert_page(&mut self, pointer: PagePointer, page: Page) -> bool {
        if self.pages.contains_key(&pointer) {
            return false;
        }
        self.pages.insert(pointer, Arc::new(page));
        true
    }

    pub fn page(&self, pointer: &PagePointer) -> Option<Arc<Page>> {
        self.pages.get(pointer).cloned()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Claim a fetch.  Returns `false` if the same account already has it in
    /// flight.
    pub fn try_begin(&mut self, account: &str, target: FetchTarget) -> bool {
        self.in_flight.insert((account.to_string(), target))
    }

    pub fn finish(&mut self, account: &str, target: &FetchTarget) {
        self.in_flight.remove(&(account.to_string(), target.clone()));
    }

    /// Whether the step that would grow this chain is currently in flight.
    pub fn is_fetching(&self, account: &str, key: &ChainKey) -> bool {
        let target = match self.next_fetch(key) {
            NextFetch::FirstPointer => FetchTarget::FirstPointer(key.clone()),
            NextFetch::Page(pointer) => FetchTarget::Page(pointer),
            NextFetch::Exhausted => return false,
        };
        self.in_flight.contains(&(account.to_string(), target))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
