//! Per-feed state: the loaded window, the buffered pool and the recompute
//! pipeline that keeps them in step with the page cache.
//!
//! ## Recompute pipeline
//!
//! 1. Concatenate the page chains of every source, dropping malformed items,
//!    and merge in the feed's pending publications.
//! 2. Filter: blocked source, blocked item, caller filter, newer-than cutoff,
//!    and pinned items when the feed spans several sources.
//! 3. Sort.
//! 4. Refresh loaded slots in place (confirmations, fresher copies).
//! 5. Drop candidates already loaded; the rest is the buffered pool.
//! 6. Move the shortfall of the current page from the pool into the window.
//! 7. Work out `has_more` and which sources need prefetching.
//!
//! The loaded window is append-only: a later recompute never removes or
//! reorders what a caller has already been shown.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;

use super::blocklist::Blocklist;
use super::item_index::ItemIndex;
use super::page_cache::{ChainKey, ChainSignature, PageCache};
use super::pending::PendingStore;
use super::scheduler::Fingerprint;
use super::sort::sort_items;
use super::spec::{FeedKey, FeedSpec, INITIAL_PAGE_NUMBER};
use crate::error::FeedError;
use crate::source::{Item, ItemKey};

/// Errors kept per feed; older ones are dropped.
pub const MAX_FEED_ERRORS: usize = 20;

/// Where a feed is in its life.  There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// Registered, never recomputed.
    Uninitialized,
    /// Sources registered, nothing to show yet.
    Buffering,
    /// Has loaded or buffered items.
    Ready,
}

/// Status reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Initializing,
    Fetching,
    Succeeded,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Initializing => f.write_str("initializing"),
            FeedStatus::Fetching => f.write_str("fetching"),
            FeedStatus::Succeeded => f.write_str("succeeded"),
        }
    }
}

/// What a caller reads from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// The loaded window.
    pub items: Vec<Item>,
    pub has_more: bool,
    pub state: FeedStatus,
    pub errors: Vec<FeedError>,
    /// Fetched but not yet shown.
    pub buffered: usize,
    pub page_number: usize,
}

/// Shared, read-only view of the engine state a recompute needs.
pub struct RecomputeInputs<'a> {
    pub cache: &'a PageCache,
    pub index: &'a ItemIndex,
    pub pending: &'a PendingStore,
    pub blocklist: &'a Blocklist,
    pub account: &'a str,
    /// Current time, Unix seconds.
    pub now: i64,
    pub low_water_mark: usize,
}

/// Canonical key of a filtered and sorted candidate pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    feed: FeedKey,
    chains: Vec<ChainSignature>,
    blocklist: u64,
    pending: u64,
    index: u64,
    cutoff: Option<i64>,
}

/// A filtered and sorted candidate pool, before loaded items are removed.
#[derive(Debug)]
pub struct SortedPool {
    items: Vec<Item>,
    /// Sources, authors and cids the blocklist removed.
    blocked_hits: HashSet<String>,
}

pub type PoolMemo = LruCache<PoolKey, Arc<SortedPool>>;

/// An empty memo holding at most `capacity` pools (at least one).
pub fn pool_memo(capacity: usize) -> PoolMemo {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

/// Result of one recompute.
#[derive(Debug, Default)]
pub struct Recompute {
    /// Chains whose buffered contribution fell to the low-water mark.
    pub prefetch: Vec<ChainKey>,
}

#[derive(Debug)]
pub struct FeedState {
    spec: FeedSpec,
    loaded: Vec<Item>,
    buffered: Vec<Item>,
    has_more: bool,
    phase: FeedPhase,
    errors: Vec<FeedError>,
    error_count: u64,
    fingerprint: Option<Fingerprint>,
    blocked_hits: HashSet<String>,
}

impl FeedState {
    pub fn new(spec: FeedSpec) -> Self {
        Self {
            spec,
            loaded: Vec::new(),
            buffered: Vec::new(),
            has_more: true,
            phase: FeedPhase::Uninitialized,
            errors: Vec::new(),
            error_count: 0,
            fingerprint: None,
            blocked_hits: HashSet::new(),
        }
    }

    pub fn spec(&self) -> &FeedSpec {
        &self.spec
    }

    pub fn loaded(&self) -> &[Item] {
        &self.loaded
    }

    pub fn buffered(&self) -> &[Item] {
        &self.buffered
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    pub fn chain_keys(&self) -> Vec<ChainKey> {
        self.spec
            .sources
            .iter()
            .map(|source| ChainKey::new(source.clone(), self.spec.sort))
            .collect()
    }

    pub fn uses_chain(&self, key: &ChainKey) -> bool {
        key.sort == self.spec.sort && self.spec.sources.contains(&key.source)
    }

    pub fn covers_source(&self, source: &crate::source::SourceAddress) -> bool {
        self.spec.sources.contains(source)
    }

    /// Whether a blocklist entry for `address` (a source, author or cid)
    /// could change this feed.
    pub fn uses_address(&self, address: &str) -> bool {
        self.spec.sources.iter().any(|s| s.as_str() == address)
            || self.blocked_hits.contains(address)
            || self.loaded.iter().chain(&self.buffered).any(|item| {
                item.author_address == address
                    || item.cid.as_ref().is_some_and(|cid| cid.as_str() == address)
            })
    }

    pub fn contains_cid(&self, cid: &crate::source::Cid) -> bool {
        self.loaded
            .iter()
            .chain(&self.buffered)
            .any(|item| item.cid.as_ref() == Some(cid))
    }

    pub fn record_error(&mut self, error: FeedError) {
        self.errors.push(error);
        if self.errors.len() > MAX_FEED_ERRORS {
            self.errors.remove(0);
        }
        self.error_count += 1;
    }

    /// Advance to the next page.  Refused while the current page is not
    /// filled yet, and once nothing is left to load, so page numbers never
    /// skip ahead of the data.
    pub fn load_more(&mut self) -> bool {
        if !self.has_more || self.loaded.len() < self.spec.page_number * self.spec.page_size {
            return false;
        }
        self.spec.page_number += 1;
        true
    }

    /// Forget the loaded window and go back to the first page.
    pub fn reset(&mut self) {
        self.loaded.clear();
        self.spec.page_number = INITIAL_PAGE_NUMBER;
        self.fingerprint = None;
    }

    fn cutoff(&self, now: i64) -> Option<i64> {
        self.spec.newer_than.map(|seconds| now - seconds)
    }

    pub fn fingerprint(&self, inputs: &RecomputeInputs<'_>) -> Fingerprint {
        Fingerprint {
            chains: self
                .chain_keys()
                .iter()
                .map(|key| inputs.cache.signature(key))
                .collect(),
            blocklist: inputs.blocklist.version(),
            pending: inputs.pending.version(),
            index: inputs.index.revision(),
            page_number: self.spec.page_number,
            errors: self.error_count,
            cutoff: self.cutoff(inputs.now),
        }
    }

    /// The cheap pre-check: has anything this feed reads changed since its
    /// last recompute?
    pub fn needs_recompute(&self, inputs: &RecomputeInputs<'_>) -> bool {
        self.fingerprint.as_ref() != Some(&self.fingerprint(inputs))
    }

    pub fn recompute(&mut self, inputs: &RecomputeInputs<'_>, memo: &mut PoolMemo) -> Recompute {
        let fingerprint = self.fingerprint(inputs);
        let pool = self.sorted_pool(inputs, &fingerprint, memo);
        self.blocked_hits = pool.blocked_hits.clone();

        self.refresh_loaded(inputs);

        let loaded_keys: HashSet<ItemKey> = self.loaded.iter().map(Item::key).collect();
        let loaded_pending: HashSet<(String, i64)> = self
            .loaded
            .iter()
            .filter(|item| item.pending)
            .map(Item::local_key)
            .collect();
        self.buffered = pool
            .items
            .iter()
            .filter(|item| {
                !loaded_keys.contains(&item.key()) && !loaded_pending.contains(&item.local_key())
            })
            .cloned()
            .collect();

        let target = self.spec.page_number * self.spec.page_size;
        if self.loaded.len() < target {
            let shortfall = (target - self.loaded.len()).min(self.buffered.len());
            self.loaded.extend(self.buffered.drain(..shortfall));
        }

        let keys = self.chain_keys();
        let all_exhausted = keys.iter().all(|key| inputs.cache.is_exhausted(key));
        self.has_more = !self.buffered.is_empty() || !all_exhausted;

        self.phase = if self.loaded.is_empty() && self.buffered.is_empty() {
            FeedPhase::Buffering
        } else {
            FeedPhase::Ready
        };

        let prefetch = keys
            .into_iter()
            .filter(|key| !inputs.cache.is_exhausted(key))
            .filter(|key| {
                let contribution = self
                    .buffered
                    .iter()
                    .filter(|item| item.source == key.source && !item.pending)
                    .count();
                contribution <= inputs.low_water_mark
            })
            .collect();

        self.fingerprint = Some(fingerprint);
        Recompute { prefetch }
    }

    /// Steps 1 to 3, memoized across feeds with the same identity and inputs.
    fn sorted_pool(
        &self,
        inputs: &RecomputeInputs<'_>,
        fingerprint: &Fingerprint,
        memo: &mut PoolMemo,
    ) -> Arc<SortedPool> {
        let key = PoolKey {
            feed: self.spec.key(),
            chains: fingerprint.chains.clone(),
            blocklist: fingerprint.blocklist,
            pending: fingerprint.pending,
            index: fingerprint.index,
            cutoff: fingerprint.cutoff,
        };
        if let Some(pool) = memo.get(&key) {
            return Arc::clone(pool);
        }

        let candidates = self.collect_candidates(inputs);
        let mut blocked_hits = HashSet::new();
        let filtered = self.filter_candidates(candidates, inputs, &mut blocked_hits);
        let pool = Arc::new(SortedPool {
            items: sort_items(filtered, self.spec.sort),
            blocked_hits,
        });
        memo.put(key, Arc::clone(&pool));
        pool
    }

    fn collect_candidates(&self, inputs: &RecomputeInputs<'_>) -> Vec<Item> {
        let mut candidates = Vec::new();
        for key in self.chain_keys() {
            for page in inputs.cache.chain(&key) {
                for item in &page.items {
                    if item.source != key.source {
                        debug!(
                            "dropping item listed under {} but published to {}",
                            key.source, item.source
                        );
                        continue;
                    }
                    if item.cid.is_none() {
                        debug!("dropping item without cid from {}", key.source);
                        continue;
                    }
                    let item = inputs.index.fresher(item).unwrap_or(item);
                    candidates.push(item.clone());
                }
            }
        }

        let confirmed: HashSet<(String, i64)> = candidates.iter().map(Item::local_key).collect();
        for local in inputs.pending.candidates(&self.spec.sources) {
            if !local.pending {
                // Confirmed: the index holds the latest copy.
                let latest = local.cid.as_ref().and_then(|cid| inputs.index.get(cid));
                candidates.push(latest.cloned().unwrap_or(local));
                continue;
            }
            if confirmed.contains(&local.local_key()) {
                continue;
            }
            match inputs.index.confirmed(&local.author_address, local.timestamp) {
                Some(remote) => candidates.push(remote.clone()),
                None => candidates.push(local),
            }
        }

        let mut seen = HashSet::new();
        candidates.retain(|item| seen.insert(item.key()));
        candidates
    }

    fn filter_candidates(
        &self,
        candidates: Vec<Item>,
        inputs: &RecomputeInputs<'_>,
        blocked_hits: &mut HashSet<String>,
    ) -> Vec<Item> {
        let cutoff = self.cutoff(inputs.now);
        let multi_source = self.spec.is_multi_source();

        candidates
            .into_iter()
            .filter(|item| {
                if inputs.blocklist.is_source_blocked(&item.source) {
                    blocked_hits.insert(item.source.to_string());
                    return false;
                }
                if inputs.blocklist.is_item_blocked(item) {
                    blocked_hits.insert(item.author_address.clone());
                    if let Some(cid) = &item.cid {
                        blocked_hits.insert(cid.to_string());
                    }
                    return false;
                }
                if let Some(filter) = &self.spec.filter {
                    if !filter.matches(item) {
                        return false;
                    }
                }
                if cutoff.is_some_and(|cutoff| item.timestamp <= cutoff) {
                    return false;
                }
                !(multi_source && item.pinned)
            })
            .collect()
    }

    /// Replace loaded slots in place: confirmed copies for pending items,
    /// assigned cids, fresher vote counts.  Positions never change.
    fn refresh_loaded(&mut self, inputs: &RecomputeInputs<'_>) {
        for slot in &mut self.loaded {
            if slot.pending {
                if let Some(remote) = inputs.index.confirmed(&slot.author_address, slot.timestamp) {
                    *slot = remote.clone();
                } else if let Some(current) = inputs.pending.get(&slot.author_address, slot.timestamp) {
                    *slot = current;
                }
            } else if let Some(fresher) = inputs.index.fresher(slot) {
                *slot = fresher.clone();
            }
        }
    }

    pub fn snapshot(&self, cache: &PageCache, account: &str) -> FeedSnapshot {
        let keys = self.chain_keys();
        let fetching = keys.iter().any(|key| cache.is_fetching(account, key));
        let all_exhausted = keys.iter().all(|key| cache.is_exhausted(key));
        let state = match self.phase {
            FeedPhase::Uninitialized => FeedStatus::Initializing,
            _ if fetching => FeedStatus::Fetching,
            FeedPhase::Buffering if !all_exhausted => FeedStatus::Fetching,
            _ => FeedStatus::Succeeded,
        };
        FeedSnapshot {
            items: self.loaded.clone(),
            has_more: self.has_more,
            state,
            errors: self.errors.clone(),
            buffered: self.buffered.len(),
            page_number: self.spec.page_number,
        }
    }
}
