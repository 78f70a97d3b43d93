//! The feed engine: owns every feed and the shared state they read, and runs
//! the background work that keeps them current.
//!
//! All state sits behind one mutex.  Callers and background tasks take it
//! briefly to read or mutate, and it is never held across an `.await`.
//!
//! ## Event flow
//!
//! ```text
//!  add_feed / load_more / block / publish          fetch task finishes
//!                 │                                        │
//!                 └──────────► mark feed dirty ◄───────────┘
//!                                     │  (first mark of a burst)
//!                                     ▼
//!                          flush after coalesce window
//!                                     │
//!               ┌─────────────────────┼──────────────────────┐
//!               ▼                     ▼                      ▼
//!     fingerprint unchanged?      recompute           claim prefetches,
//!           skip it                                  spawn fetch tasks
//!                                     │
//!                                     ▼
//!                       snapshot changed? notify observers
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::aggregator::{pool_memo, FeedSnapshot, FeedState, PoolMemo, RecomputeInputs};
use super::blocklist::Blocklist;
use super::item_index::{Freshness, ItemIndex};
use super::page_cache::{ChainKey, FetchTarget, NextFetch, PageCache};
use super::pending::PendingStore;
use super::scheduler::RecomputeScheduler;
use super::spec::FeedSpec;
use crate::config::EngineConfig;
use crate::error::{FeedError, FeedResult};
use crate::source::{Cid, ContentProvider, Item, Page, PagePointer};
use crate::store::{self, KeyValueStore};

/// Live observers of one feed plus the last snapshot they were sent.
#[derive(Default)]
struct Observers {
    senders: Vec<UnboundedSender<FeedSnapshot>>,
    last: Option<FeedSnapshot>,
}

struct EngineState {
    cache: PageCache,
    index: ItemIndex,
    pending: PendingStore,
    blocklist: Blocklist,
    feeds: HashMap<String, FeedState>,
    scheduler: RecomputeScheduler,
    memo: PoolMemo,
    observers: HashMap<String, Observers>,
    recomputes: u64,
}

impl EngineState {
    fn feeds_where(&self, mut predicate: impl FnMut(&FeedState) -> bool) -> Vec<String> {
        self.feeds
            .iter()
            .filter(|(_, feed)| predicate(feed))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

struct Inner {
    config: EngineConfig,
    provider: Arc<dyn ContentProvider>,
    store: Arc<dyn KeyValueStore>,
    state: Mutex<EngineState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn account(&self) -> &str {
        self.provider.account()
    }
}

/// Handle to the engine.  Clones share the same state.
///
/// Every method that can schedule background work must be called from
/// inside a tokio runtime.
#[derive(Clone)]
pub struct FeedEngine {
    inner: Arc<Inner>,
}

impl FeedEngine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn ContentProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let memo = pool_memo(config.pool_memo_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                store,
                state: Mutex::new(EngineState {
                    cache: PageCache::new(),
                    index: ItemIndex::new(),
                    pending: PendingStore::new(),
                    blocklist: Blocklist::new(),
                    feeds: HashMap::new(),
                    scheduler: RecomputeScheduler::new(),
                    memo,
                    observers: HashMap::new(),
                    recomputes: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Feed lifecycle
    // -----------------------------------------------------------------------

    /// Register `spec` under `name`.
    ///
    /// Registering the same identity again keeps the existing feed and its
    /// page number.  A different identity replaces the feed; its observers
    /// stay subscribed.
    pub fn add_feed(&self, name: &str, spec: FeedSpec) -> FeedResult<()> {
        spec.validate()?;
        let mut state = self.inner.lock();
        if let Some(existing) = state.feeds.get(name) {
            if existing.spec().key() == spec.key() {
                debug!("feed {name} already registered");
                return Ok(());
            }
            info!("replacing feed {name}");
        }
        info!(
            "registering feed {name}: {} source(s) sorted by {}",
            spec.sources.len(),
            spec.sort
        );
        state.feeds.insert(name.to_string(), FeedState::new(spec));
        if let Some(observers) = state.observers.get_mut(name) {
            observers.last = None;
        }
        self.mark(&mut state, name);
        Ok(())
    }

    /// Tear down a feed and close its observers.  Fetches already in flight
    /// run to completion and their pages stay cached.
    pub fn remove_feed(&self, name: &str) -> FeedResult<()> {
        let mut state = self.inner.lock();
        if state.feeds.remove(name).is_none() {
            return Err(FeedError::UnknownFeed(name.to_string()));
        }
        state.observers.remove(name);
        state.scheduler.forget(name);
        info!("removed feed {name}");
        Ok(())
    }

    /// Ask for the next page.  Returns `false` when the current page is not
    /// full yet.
    pub fn load_more(&self, name: &str) -> FeedResult<bool> {
        let mut state = self.inner.lock();
        let feed = state
            .feeds
            .get_mut(name)
            .ok_or_else(|| FeedError::UnknownFeed(name.to_string()))?;
        if !feed.load_more() {
            return Ok(false);
        }
        debug!("feed {name} advanced to page {}", feed.spec().page_number);
        self.mark(&mut state, name);
        Ok(true)
    }

    /// Forget the loaded window and start over from the first page.
    pub fn reset(&self, name: &str) -> FeedResult<()> {
        let mut state = self.inner.lock();
        state
            .feeds
            .get_mut(name)
            .ok_or_else(|| FeedError::UnknownFeed(name.to_string()))?
            .reset();
        self.mark(&mut state, name);
        Ok(())
    }

    pub fn snapshot(&self, name: &str) -> FeedResult<FeedSnapshot> {
        let state = self.inner.lock();
        state
            .feeds
            .get(name)
            .map(|feed| feed.snapshot(&state.cache, self.inner.account()))
            .ok_or_else(|| FeedError::UnknownFeed(name.to_string()))
    }

    /// Receive a snapshot of `name` now and after every recompute that
    /// changed it.  Dropping the receiver unsubscribes.
    pub fn subscribe(&self, name: &str) -> FeedResult<UnboundedReceiver<FeedSnapshot>> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let snapshot = state
            .feeds
            .get(name)
            .map(|feed| feed.snapshot(&state.cache, self.inner.account()))
            .ok_or_else(|| FeedError::UnknownFeed(name.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(snapshot.clone());
        let observers = state.observers.entry(name.to_string()).or_default();
        observers.senders.push(tx);
        observers.last = Some(snapshot);
        Ok(rx)
    }

    pub fn feed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().feeds.keys().cloned().collect();
        names.sort();
        names
    }

    /// Recomputes run so far.
    pub fn recompute_count(&self) -> u64 {
        self.inner.lock().recomputes
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.pending_count()
    }

    // -----------------------------------------------------------------------
    // Blocklist
    // -----------------------------------------------------------------------

    /// Block a source or author address.  Only feeds that list the source
    /// or hold an item by the author are recomputed.
    pub fn block(&self, address: &str) -> bool {
        let mut state = self.inner.lock();
        if !state.blocklist.block_address(address) {
            return false;
        }
        info!("blocked {address}");
        let names = state.feeds_where(|feed| feed.uses_address(address));
        self.mark_all(&mut state, names);
        true
    }

    pub fn unblock(&self, address: &str) -> bool {
        let mut state = self.inner.lock();
        if !state.blocklist.unblock_address(address) {
            return false;
        }
        info!("unblocked {address}");
        let names = state.feeds_where(|feed| feed.uses_address(address));
        self.mark_all(&mut state, names);
        true
    }

    pub fn block_cid(&self, cid: &Cid) -> bool {
        let mut state = self.inner.lock();
        if !state.blocklist.block_cid(cid) {
            return false;
        }
        info!("blocked item {cid}");
        let names = state.feeds_where(|feed| feed.contains_cid(cid));
        self.mark_all(&mut state, names);
        true
    }

    pub fn unblock_cid(&self, cid: &Cid) -> bool {
        let mut state = self.inner.lock();
        if !state.blocklist.unblock_cid(cid) {
            return false;
        }
        info!("unblocked item {cid}");
        let names = state.feeds_where(|feed| feed.uses_address(cid.as_str()));
        self.mark_all(&mut state, names);
        true
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Show a locally-authored item right away and hand it to the provider.
    ///
    /// The item stays pending until a fetched page carries its confirmed
    /// copy, however long that takes.
    pub fn publish(&self, item: Item) -> FeedResult<()> {
        {
            let mut state = self.inner.lock();
            state.pending.insert(item.clone())?;
            info!(
                "publishing to {} as {} at {}",
                item.source, item.author_address, item.timestamp
            );
            let names = state.feeds_where(|feed| feed.covers_source(&item.source));
            self.mark_all(&mut state, names);
        }
        let engine = self.clone();
        tokio::spawn(async move { engine.run_publish(item).await });
        Ok(())
    }

    async fn run_publish(self, item: Item) {
        let result = self.inner.provider.publish(&item).await;

        let mut state = self.inner.lock();
        let affected = match result {
            Ok(Some(cid)) => {
                debug!("publication by {} verified as {cid}", item.author_address);
                state
                    .pending
                    .assign_cid(&item.author_address, item.timestamp, cid)
                    .map(|source| state.feeds_where(|feed| feed.covers_source(&source)))
                    .unwrap_or_default()
            }
            Ok(None) => {
                info!(
                    "publication by {} at {} not verified yet",
                    item.author_address, item.timestamp
                );
                Vec::new()
            }
            Err(e) => {
                warn!("publishing to {} failed: {e:#}", item.source);
                let names = state.feeds_where(|feed| feed.covers_source(&item.source));
                for name in &names {
                    if let Some(feed) = state.feeds.get_mut(name) {
                        feed.record_error(FeedError::Publish {
                            message: format!("{e:#}"),
                        });
                    }
                }
                names
            }
        };
        self.mark_all(&mut state, affected);
    }

    // -----------------------------------------------------------------------
    // Recompute scheduling
    // -----------------------------------------------------------------------

    fn mark(&self, state: &mut EngineState, name: &str) {
        if state.scheduler.mark(name) {
            let engine = self.clone();
            tokio::spawn(async move { engine.flush().await });
        }
    }

    fn mark_all(&self, state: &mut EngineState, names: Vec<String>) {
        for name in names {
            self.mark(state, &name);
        }
    }

    /// Recompute every dirty feed once the coalesce window has passed.
    async fn flush(self) {
        tokio::time::sleep(self.inner.config.coalesce_window).await;

        let mut fetches = Vec::new();
        let mut notifications = Vec::new();
        {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let account = self.inner.account();
            let now = Utc::now().timestamp();

            for name in state.scheduler.take() {
                let Some(feed) = state.feeds.get_mut(&name) else {
                    continue;
                };
                let inputs = RecomputeInputs {
                    cache: &state.cache,
                    index: &state.index,
                    pending: &state.pending,
                    blocklist: &state.blocklist,
                    account,
                    now,
                    low_water_mark: self.inner.config.low_water_mark,
                };
                let prefetch = if feed.needs_recompute(&inputs) {
                    state.recomputes += 1;
                    feed.recompute(&inputs, &mut state.memo).prefetch
                } else {
                    debug!("feed {name} unchanged, skipping recompute");
                    Vec::new()
                };

                for key in prefetch {
                    if let Some(target) = claim(&mut state.cache, account, &key) {
                        debug!("feed {name} prefetching {} ({})", key.source, key.sort);
                        fetches.push((key, target));
                    }
                }

                let snapshot = feed.snapshot(&state.cache, account);
                if let Some(observers) = state.observers.get_mut(&name) {
                    observers.senders.retain(|tx| !tx.is_closed());
                    if observers.last.as_ref() != Some(&snapshot) {
                        observers.last = Some(snapshot.clone());
                        notifications.extend(
                            observers
                                .senders
                                .iter()
                                .map(|tx| (tx.clone(), snapshot.clone())),
                        );
                    }
                }
            }
        }

        for (key, target) in fetches {
            let engine = self.clone();
            tokio::spawn(async move { engine.run_fetch(key, target).await });
        }
        for (tx, snapshot) in notifications {
            // A closed receiver is pruned on the next flush.
            let _ = tx.send(snapshot);
        }
    }

    // -----------------------------------------------------------------------
    // Fetching
    // -----------------------------------------------------------------------

    /// Drive one claimed fetch to success, retrying with backoff.  A chain
    /// whose first pointer arrives continues straight into its first page.
    /// Fetches are never cancelled: a chain nobody reads any more is still
    /// completed and cached.
    async fn run_fetch(self, key: ChainKey, target: FetchTarget) {
        let mut target = Some(target);
        let mut attempt = 0;

        while let Some(current) = target.take() {
            match self.fetch_once(&key, &current).await {
                Ok(fetched) => {
                    attempt = 0;
                    target = self.apply(&key, current, fetched);
                }
                Err(e) => {
                    attempt += 1;
                    let delay = self.inner.config.retry_delay(attempt);
                    warn!(
                        "fetching {} ({}) failed, attempt {attempt}, retrying in {delay:?}: {e:#}",
                        key.source, key.sort
                    );
                    if !self.record_fetch_error(&key, &e) {
                        debug!(
                            "no feed reads {} ({}) any more, still retrying",
                            key.source, key.sort
                        );
                    }
                    tokio::time::sleep(delay).await;
                    target = Some(current);
                }
            }
        }
    }

    async fn fetch_once(&self, key: &ChainKey, target: &FetchTarget) -> anyhow::Result<Fetched> {
        match target {
            FetchTarget::FirstPointer(_) => {
                let pointer = self
                    .inner
                    .provider
                    .first_page_pointer(&key.source, key.sort)
                    .await?;
                Ok(Fetched::FirstPointer(pointer))
            }
            FetchTarget::Page(pointer) => {
                if let Some(page) = store::load_page(self.inner.store.as_ref(), pointer) {
                    debug!("page {pointer} served from the store");
                    return Ok(Fetched::Page(page));
                }
                let page = self
                    .inner
                    .provider
                    .fetch_page(&key.source, key.sort, pointer)
                    .await?;
                store::save_page(self.inner.store.as_ref(), pointer, &page);
                Ok(Fetched::Page(page))
            }
        }
    }

    /// Fold a fetch result into the shared state and mark the feeds it
    /// concerns.  Returns the follow-up fetch this task should run, if any.
    fn apply(&self, key: &ChainKey, target: FetchTarget, fetched: Fetched) -> Option<FetchTarget> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let account = self.inner.account();
        state.cache.finish(account, &target);

        let mut affected = Vec::new();
        let mut follow_up = None;
        match fetched {
            Fetched::FirstPointer(pointer) => {
                debug!(
                    "{} ({}) starts at {}",
                    key.source,
                    key.sort,
                    pointer.as_ref().map_or("nothing", PagePointer::as_str)
                );
                state.cache.set_first_pointer(key.clone(), pointer);
                if matches!(state.cache.next_fetch(key), NextFetch::Page(_)) {
                    follow_up = claim(&mut state.cache, account, key);
                }
            }
            Fetched::Page(page) => {
                let FetchTarget::Page(pointer) = target else {
                    return None;
                };
                debug!("page {pointer} has {} item(s)", page.items.len());

                for item in &page.items {
                    if state.index.observe(item) == Freshness::Updated {
                        if let Some(cid) = &item.cid {
                            affected.extend(state.feeds_where(|feed| feed.contains_cid(cid)));
                        }
                    }
                }
                for source in state.pending.reconcile(&page.items) {
                    info!("publication confirmed in {source}");
                    affected.extend(state.feeds_where(|feed| feed.covers_source(&source)));
                }
                state.cache.insert_page(pointer, page);
            }
        }

        affected.extend(state.feeds_where(|feed| feed.uses_chain(key)));
        affected.sort();
        affected.dedup();
        self.mark_all(state, affected);
        follow_up
    }

    /// Record a failed fetch on every feed reading the chain.  Returns
    /// whether any feed still reads it.
    fn record_fetch_error(&self, key: &ChainKey, error: &anyhow::Error) -> bool {
        let mut state = self.inner.lock();
        let names = state.feeds_where(|feed| feed.uses_chain(key));
        for name in &names {
            if let Some(feed) = state.feeds.get_mut(name) {
                feed.record_error(FeedError::Fetch {
                    address: key.source.clone(),
                    message: format!("{error:#}"),
                });
            }
        }
        let still_used = !names.is_empty();
        self.mark_all(&mut state, names);
        still_used
    }
}

enum Fetched {
    FirstPointer(Option<PagePointer>),
    Page(Page),
}

/// Claim the step that grows `key`'s chain.  `None` when the chain is
/// exhausted or the step is already in flight for this account.
fn claim(cache: &mut PageCache, account: &str, key: &ChainKey) -> Option<FetchTarget> {
    let target = match cache.next_fetch(key) {
        NextFetch::FirstPointer => FetchTarget::FirstPointer(key.clone()),
        NextFetch::Page(pointer) => FetchTarget::Page(pointer),
        NextFetch::Exhausted => return None,
    };
    cache.try_begin(account, target.clone()).then_some(target)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::feed::{FeedStatus, SortType};
    use crate::source::{MemoryProvider, SourceAddress};
    use crate::store::MemoryStore;

    fn config() -> EngineConfig {
        EngineConfig {
            account: "me".into(),
            coalesce_window: Duration::from_millis(5),
            retry_base: Duration::from_millis(10),
            retry_max: Duration::from_millis(40),
            ..EngineConfig::default()
        }
    }

    fn engine_with(provider: &Arc<MemoryProvider>) -> FeedEngine {
        FeedEngine::new(
            config(),
            Arc::clone(provider) as Arc<dyn ContentProvider>,
            Arc::new(MemoryStore::new(100)),
        )
    }

    fn item(cid: &str, source: &str, timestamp: i64) -> Item {
        Item {
            cid: Some(Cid::new(cid)),
            source: SourceAddress::new(source),
            author_address: format!("author-{cid}"),
            timestamp,
            updated_at: None,
            upvote_count: 0,
            downvote_count: 0,
            reply_count: 0,
            pinned: false,
            title: Some(format!("post {cid}")),
            content: None,
            link: None,
            pending: false,
        }
    }

    /// `count` items, newest first, starting `offset` items down.
    fn items(source: &str, offset: usize, count: usize) -> Vec<Item> {
        (offset..offset + count)
            .map(|n| item(&format!("{source}-{n}"), source, 1_000_000 - n as i64))
            .collect()
    }

    fn spec(source: &str, sort: SortType, page_size: usize) -> FeedSpec {
        FeedSpec::new(vec![SourceAddress::new(source)], sort, page_size)
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn wait_for(
        engine: &FeedEngine,
        name: &str,
        done: impl Fn(&FeedSnapshot) -> bool,
    ) -> FeedSnapshot {
        eventually(|| engine.snapshot(name).map(|s| done(&s)).unwrap_or(false)).await;
        engine.snapshot(name).unwrap()
    }

    #[tokio::test]
    async fn basic_pagination() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 100)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        let snapshot = wait_for(&engine, "main", |s| {
            s.items.len() == 25 && s.state == FeedStatus::Succeeded
        })
        .await;
        assert!(snapshot.has_more);
        assert_eq!(snapshot.items[0].cid, Some(Cid::new("s-0")));

        for expected in [50, 75, 100] {
            assert!(engine.load_more("main").unwrap());
            let snapshot = wait_for(&engine, "main", |s| s.items.len() == expected).await;
            assert_eq!(snapshot.page_number, expected / 25);
        }
        let snapshot = wait_for(&engine, "main", |s| !s.has_more).await;
        assert_eq!(snapshot.items.len(), 100);
        assert_eq!(snapshot.buffered, 0);
        assert!(snapshot.errors.is_empty());
    }

    #[tokio::test]
    async fn load_more_waits_for_a_full_page() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 10)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        wait_for(&engine, "main", |s| s.items.len() == 10).await;
        assert!(!engine.load_more("main").unwrap());
        assert_eq!(engine.snapshot("main").unwrap().page_number, 1);
    }

    #[tokio::test]
    async fn prefetches_at_the_low_water_mark() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let source = SourceAddress::new("s");
        provider.add_chain(
            &source,
            SortType::New,
            vec![items("s", 0, 100), items("s", 100, 100)],
        );
        let second = MemoryProvider::pointer(&source, SortType::New, 1);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        wait_for(&engine, "main", |s| s.items.len() == 25).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(provider.fetch_count(&second), 0, "75 buffered, above the mark");

        assert!(engine.load_more("main").unwrap());
        eventually(|| provider.fetch_count(&second) == 1).await;
        let snapshot = wait_for(&engine, "main", |s| s.buffered == 150).await;
        assert_eq!(snapshot.items.len(), 50, "prefetch does not load more by itself");
    }

    #[tokio::test]
    async fn blocking_an_unrelated_address_does_not_recompute() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 40)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 25 && s.buffered == 15).await;

        let mut updates = engine.subscribe("main").unwrap();
        assert_eq!(updates.recv().await.unwrap().items.len(), 25);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = engine.recompute_count();

        assert!(engine.block("someone-else"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(engine.recompute_count(), before);
        assert!(updates.try_recv().is_err());

        assert!(engine.block("author-s-30"));
        let update = updates.recv().await.unwrap();
        assert_eq!(update.buffered, 14);
        assert!(!update.items.iter().any(|i| i.author_address == "author-s-30"));
        assert!(engine.recompute_count() > before);

        assert!(!engine.block("author-s-30"), "already blocked");
        assert!(engine.unblock("author-s-30"));
        wait_for(&engine, "main", |s| s.buffered == 15).await;
    }

    #[tokio::test]
    async fn blocking_a_loaded_item_by_cid() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 5)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 5).await;

        // Loaded slots are never removed; the block applies to what is
        // not shown yet.
        assert!(engine.block_cid(&Cid::new("s-2")));
        engine.reset("main").unwrap();
        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 4).await;
        assert!(!snapshot.items.iter().any(|i| i.cid == Some(Cid::new("s-2"))));

        assert!(engine.unblock_cid(&Cid::new("s-2")));
        engine.reset("main").unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 5).await;
    }

    #[tokio::test]
    async fn pending_item_is_replaced_by_its_confirmation() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![items("s", 0, 5)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 5).await;

        let mine = Item {
            cid: None,
            author_address: "me".into(),
            ..item("unused", "s", 2_000_000)
        };
        engine.publish(mine.clone()).unwrap();
        assert_eq!(
            engine.publish(mine.clone()),
            Err(FeedError::DuplicatePending {
                author: "me".into(),
                timestamp: 2_000_000
            })
        );
        // Appended after the already-loaded window.
        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 6).await;
        assert!(snapshot.items[5].pending);
        assert_eq!(engine.pending_count(), 1);

        // The confirmed copy shows up in another listing of the source.
        let confirmed = Item {
            cid: Some(MemoryProvider::cid_for(&mine)),
            upvote_count: 3,
            ..mine
        };
        provider.add_chain(&source, SortType::Hot, vec![vec![confirmed]]);
        engine.add_feed("hot", spec("s", SortType::Hot, 25)).unwrap();

        let snapshot = wait_for(&engine, "main", |s| {
            s.items.get(5).is_some_and(|i| !i.pending)
        })
        .await;
        assert_eq!(snapshot.items.len(), 6, "one copy, same slot");
        assert_eq!(snapshot.items[5].upvote_count, 3);
        assert_eq!(snapshot.items[5].cid, Some(Cid::new("me-2000000")));
        assert_eq!(snapshot.buffered, 0);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(provider.published().len(), 1);
    }

    #[tokio::test]
    async fn failed_fetches_are_retried() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![items("s", 0, 30)]);
        let first = MemoryProvider::pointer(&source, SortType::New, 0);
        provider.fail_next(&first, 2);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 25).await;
        assert_eq!(provider.fetch_count(&first), 3);
        assert_eq!(snapshot.errors.len(), 2);
        assert!(matches!(
            &snapshot.errors[0],
            FeedError::Fetch { address, .. } if *address == source
        ));
    }

    #[tokio::test]
    async fn fetches_outlive_their_feed() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![items("s", 0, 30)]);
        let first = MemoryProvider::pointer(&source, SortType::New, 0);
        provider.fail_next(&first, 4);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        wait_for(&engine, "main", |s| !s.errors.is_empty()).await;
        engine.remove_feed("main").unwrap();

        eventually(|| engine.inner.lock().cache.page(&first).is_some()).await;
        assert_eq!(provider.fetch_count(&first), 5);

        // Coming back finds the page warm.
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 25).await;
        assert!(snapshot.errors.is_empty());
        assert_eq!(provider.fetch_count(&first), 5);
    }

    #[tokio::test]
    async fn a_burst_of_signals_is_one_recompute() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 100)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| {
            s.items.len() == 25 && s.state == FeedStatus::Succeeded
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = engine.recompute_count();

        assert!(engine.load_more("main").unwrap());
        assert!(engine.block("author-s-1"));
        assert!(engine.block("author-s-2"));

        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 50).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(engine.recompute_count(), before + 1);
        // Blocked items stay in their loaded slots.
        assert_eq!(snapshot.buffered, 50);
    }

    #[tokio::test]
    async fn shared_pages_are_fetched_once() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![items("s", 0, 30)]);
        provider.set_latency(Duration::from_millis(20));
        let engine = engine_with(&provider);
        engine.add_feed("a", spec("s", SortType::New, 25)).unwrap();
        engine.add_feed("b", spec("s", SortType::New, 10)).unwrap();

        wait_for(&engine, "a", |s| s.items.len() == 25).await;
        wait_for(&engine, "b", |s| s.items.len() == 10).await;
        assert_eq!(
            provider.fetch_count(&MemoryProvider::pointer(&source, SortType::New, 0)),
            1
        );
    }

    #[tokio::test]
    async fn empty_source_succeeds_with_nothing() {
        let provider = Arc::new(MemoryProvider::new("me"));
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("nowhere", SortType::Hot, 25)).unwrap();

        let snapshot = wait_for(&engine, "main", |s| s.state == FeedStatus::Succeeded).await;
        assert!(snapshot.items.is_empty());
        assert!(!snapshot.has_more);
    }

    #[tokio::test]
    async fn feed_registration_rules() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 60)]);
        let engine = engine_with(&provider);

        assert!(matches!(
            engine.add_feed("bad", spec("s", SortType::New, 0)),
            Err(FeedError::InvalidSpec(_))
        ));
        assert_eq!(
            engine.load_more("missing"),
            Err(FeedError::UnknownFeed("missing".into()))
        );

        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 25).await;
        engine.load_more("main").unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 50).await;

        // Same identity: kept as is.
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        assert_eq!(engine.snapshot("main").unwrap().page_number, 2);

        // New identity: replaced.
        engine.add_feed("main", spec("s", SortType::New, 10)).unwrap();
        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 10).await;
        assert_eq!(snapshot.page_number, 1);
        assert_eq!(engine.feed_names(), vec!["main".to_string()]);
    }

    #[tokio::test]
    async fn removing_a_feed_closes_its_observers() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 5)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();

        let mut updates = engine.subscribe("main").unwrap();
        assert!(updates.recv().await.is_some());
        engine.remove_feed("main").unwrap();
        while updates.recv().await.is_some() {}

        assert!(engine.snapshot("main").is_err());
        assert_eq!(
            engine.remove_feed("main"),
            Err(FeedError::UnknownFeed("main".into()))
        );
    }

    #[tokio::test]
    async fn reset_starts_over() {
        let provider = Arc::new(MemoryProvider::new("me"));
        provider.add_chain(&SourceAddress::new("s"), SortType::New, vec![items("s", 0, 60)]);
        let engine = engine_with(&provider);
        engine.add_feed("main", spec("s", SortType::New, 25)).unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 25).await;
        engine.load_more("main").unwrap();
        wait_for(&engine, "main", |s| s.items.len() == 50).await;

        engine.reset("main").unwrap();
        let snapshot = wait_for(&engine, "main", |s| s.items.len() == 25).await;
        assert_eq!(snapshot.page_number, 1);
        assert_eq!(snapshot.buffered, 35);
    }
}
