//! Content provider abstraction layer.
//!
//! This module defines the [`ContentProvider`] trait and the data model it
//! speaks ([`Item`], [`Page`] and the identifier newtypes).  Concrete
//! providers live in sub-modules: [`RssProvider`] over RSS 2.0 feeds, plus a
//! scripted in-memory network the engine tests run against.
//!
//! ## For contributors: adding a new provider
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct (e.g. `AtomProvider`) and implement [`ContentProvider`]
//!    for it.
//! 3. Add `mod atom;` below and re-export your struct in the `pub use` block.
//! 4. Hand an instance to [`crate::FeedEngine::new`].
//!
//! Chaining, de-duplication, sorting and reconciliation are all
//! provider-agnostic.

mod item;
#[cfg(test)]
mod memory;
mod rss;

pub use item::{Cid, Item, ItemKey, Page, PagePointer, SourceAddress};
#[cfg(test)]
pub use memory::MemoryProvider;
pub use rss::RssProvider;

use anyhow::Result;
use async_trait::async_trait;

use crate::feed::SortType;

/// Trait that every content provider must implement.
///
/// The engine calls these methods from background tasks, so implementations
/// must be [`Send`] + [`Sync`].  Errors are treated as transient: the engine
/// logs them, records them on the affected feeds and retries.
///
/// ## Implementing a new provider
///
/// ```ignore
/// pub struct MyProvider { /* client, config */ }
///
/// #[async_trait]
/// impl ContentProvider for MyProvider {
///     fn account(&self) -> &str { "anonymous" }
///
///     async fn first_page_pointer(&self, source: &SourceAddress, sort: SortType)
///         -> Result<Option<PagePointer>> { todo!() }
///
///     async fn fetch_page(&self, source: &SourceAddress, sort: SortType, pointer: &PagePointer)
///         -> Result<Page> { todo!() }
///
///     async fn publish(&self, item: &Item) -> Result<Option<Cid>> { todo!() }
/// }
/// ```
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Identity of the account fetches are made with.  Concurrent fetches are
    /// de-duplicated per `(account, page)`.
    fn account(&self) -> &str;

    /// Pointer to the first page of `source` listed by `sort`, or `None` if
    /// the source has nothing to list.
    async fn first_page_pointer(
        &self,
        source: &SourceAddress,
        sort: SortType,
    ) -> Result<Option<PagePointer>>;

    /// Fetch a single page.
    async fn fetch_page(
        &self,
        source: &SourceAddress,
        sort: SortType,
        pointer: &PagePointer,
    ) -> Result<Page>;

    /// Publish a locally-authored item.
    ///
    /// Returns the item's cid once the network verified the publication, or
    /// `None` if verification did not complete.
    async fn publish(&self, item: &Item) -> Result<Option<Cid>>;
}
