//! In-memory content provider.
//!
//! Holds scripted page chains, counts fetches and can inject transient
//! failures.  Compiled for tests only.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{Cid, ContentProvider, Item, Page, PagePointer, SourceAddress};
use crate::feed::SortType;

#[derive(Default)]
struct MemoryState {
    first_pages: HashMap<(SourceAddress, SortType), PagePointer>,
    pages: HashMap<PagePointer, Page>,
    /// Remaining injected failures per page.
    failures: HashMap<PagePointer, usize>,
    fetches: Vec<PagePointer>,
    published: Vec<Item>,
    confirm_publications: bool,
    latency: Option<Duration>,
}

pub struct MemoryProvider {
    account: String,
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            state: Mutex::new(MemoryState {
                confirm_publications: true,
                ..MemoryState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a page chain for `(source, sort)`.
    ///
    /// Pages get the pointers `<source>/<sort>/<n>` and are linked in order;
    /// the last page has no next pointer.  An empty `pages` makes the source
    /// list nothing for that sort.
    pub fn add_chain(&self, source: &SourceAddress, sort: SortType, pages: Vec<Vec<Item>>) {
        let pointers: Vec<PagePointer> = (0..pages.len())
            .map(|n| Self::pointer(source, sort, n))
            .collect();
        let mut state = self.state();
        if let Some(first) = pointers.first() {
            state.first_pages.insert((source.clone(), sort), first.clone());
        }
        for (n, items) in pages.into_iter().enumerate() {
            let page = Page {
                items,
                next_page: pointers.get(n + 1).cloned(),
            };
            state.pages.insert(pointers[n].clone(), page);
        }
    }

    /// The pointer [`MemoryProvider::add_chain`] gives page `n`.
    pub fn pointer(source: &SourceAddress, sort: SortType, n: usize) -> PagePointer {
        PagePointer(format!("{source}/{sort}/{n}"))
    }

    /// Make the next `times` fetches of `pointer` fail.
    pub fn fail_next(&self, pointer: &PagePointer, times: usize) {
        self.state().failures.insert(pointer.clone(), times);
    }

    /// Delay every page fetch.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Whether `publish` reports a cid.
    pub fn set_confirm_publications(&self, confirm: bool) {
        self.state().confirm_publications = confirm;
    }

    /// How many times `pointer` was requested, failures included.
    pub fn fetch_count(&self, pointer: &PagePointer) -> usize {
        self.state().fetches.iter().filter(|p| *p == pointer).count()
    }

    pub fn total_fetches(&self) -> usize {
        self.state().fetches.len()
    }

    pub fn published(&self) -> Vec<Item> {
        self.state().published.clone()
    }

    /// The cid a confirmed publication of `item` receives.
    pub fn cid_for(item: &Item) -> Cid {
        Cid(format!("{}-{}", item.author_address, item.timestamp))
    }
}

#[async_trait]
impl ContentProvider for MemoryProvider {
    fn account(&self) -> &str {
        &self.account
    }

    async fn first_page_pointer(
        &self,
        source: &SourceAddress,
        sort: SortType,
    ) -> Result<Option<PagePointer>> {
        Ok(self.state().first_pages.get(&(source.clone(), sort)).cloned())
    }

    async fn fetch_page(
        &self,
        _source: &SourceAddress,
        _sort: SortType,
        pointer: &PagePointer,
    ) -> Result<Page> {
        let latency = {
            let mut state = self.state();
            state.fetches.push(pointer.clone());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(remaining) = state.failures.get_mut(pointer) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("injected failure for {pointer}"));
            }
        }
        state
            .pages
            .get(pointer)
            .cloned()
            .ok_or_else(|| anyhow!("no page {pointer}"))
    }

    async fn publish(&self, item: &Item) -> Result<Option<Cid>> {
        let mut state = self.state();
        state.published.push(item.clone());
        if state.confirm_publications {
            Ok(Some(Self::cid_for(item)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(cid: &str) -> Item {
        Item {
            cid: Some(Cid::new(cid)),
            source: SourceAddress::new("s"),
            author_address: "a".into(),
            timestamp: 1,
            updated_at: None,
            upvote_count: 0,
            downvote_count: 0,
            reply_count: 0,
            pinned: false,
            title: None,
            content: None,
            link: None,
            pending: false,
        }
    }

    #[tokio::test]
    async fn chains_are_linked_in_order() {
        let provider = MemoryProvider::new("me");
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![vec![item("a")], vec![item("b")]]);

        let first = provider
            .first_page_pointer(&source, SortType::New)
            .await
            .unwrap()
            .unwrap();
        let page = provider.fetch_page(&source, SortType::New, &first).await.unwrap();
        assert_eq!(page.items[0].cid, Some(Cid::new("a")));

        let next = page.next_page.unwrap();
        let last = provider.fetch_page(&source, SortType::New, &next).await.unwrap();
        assert!(last.next_page.is_none());
        assert_eq!(provider.total_fetches(), 2);
    }

    #[tokio::test]
    async fn unknown_chain_has_no_first_page() {
        let provider = MemoryProvider::new("me");
        let pointer = provider
            .first_page_pointer(&SourceAddress::new("nope"), SortType::Hot)
            .await
            .unwrap();
        assert!(pointer.is_none());
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let provider = MemoryProvider::new("me");
        let source = SourceAddress::new("s");
        provider.add_chain(&source, SortType::New, vec![vec![item("a")]]);
        let pointer = MemoryProvider::pointer(&source, SortType::New, 0);
        provider.fail_next(&pointer, 1);

        assert!(provider.fetch_page(&source, SortType::New, &pointer).await.is_err());
        assert!(provider.fetch_page(&source, SortType::New, &pointer).await.is_ok());
        assert_eq!(provider.fetch_count(&pointer), 2);
    }

    #[tokio::test]
    async fn publish_confirms_unless_disabled() {
        let provider = MemoryProvider::new("me");
        let mut local = item("x");
        local.cid = None;

        let cid = provider.publish(&local).await.unwrap();
        assert_eq!(cid, Some(MemoryProvider::cid_for(&local)));

        provider.set_confirm_publications(false);
        assert_eq!(provider.publish(&local).await.unwrap(), None);
        assert_eq!(provider.published().len(), 2);
    }
}
