//! livescroll: a feed aggregation and pagination engine.
//!
//! Merges content from many sources into live, sorted, paginated feeds.
//! Pages are fetched lazily and prefetched ahead of the reader, locally
//! published items appear immediately and are swapped for their confirmed
//! copies once the network reports them.
//!
//! ## Architecture overview
//!
//! ```text
//!                        ┌──────────────────────────────┐
//!  add_feed / load_more  │          FeedEngine          │  FeedSnapshot
//!  block / publish  ───► │                              │ ─────────────►
//!                        │  feeds ─► aggregator ─► sort │  (observers)
//!                        │    ▲          ▲              │
//!                        │    │     page cache, index,  │
//!                        │    │     pending, blocklist  │
//!                        │ scheduler        ▲           │
//!                        └──────────────────┼───────────┘
//!                                           │ fetch tasks
//!                              ┌────────────┴─────────────┐
//!                              ▼                          ▼
//!                      ContentProvider              KeyValueStore
//!                    (rss / ...)                   (warm page cache)
//! ```
//!
//! * **`source/`**: the [`ContentProvider`] trait, the data model and the
//!   concrete providers.
//! * **`feed/`**: feed specs, page chains, sorting, the per-feed recompute
//!   pipeline and the [`FeedEngine`] that runs it all.
//! * **`store`**: the persistent page cache contract.
//! * **`config`**: engine tunables from the environment.

pub mod config;
pub mod error;
pub mod feed;
pub mod source;
pub mod store;

pub use config::EngineConfig;
pub use error::{FeedError, FeedResult};
pub use feed::{FeedEngine, FeedSnapshot, FeedSpec, FeedStatus, SortType};
pub use source::{ContentProvider, Item, Page, SourceAddress};
pub use store::{KeyValueStore, MemoryStore};
