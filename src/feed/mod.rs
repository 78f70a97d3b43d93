//! Feed aggregation.
//!
//! A feed merges the page chains of one or more sources into a single
//! sorted, de-duplicated, paginated list.  The pieces:
//!
//! - [`spec`]: what a caller asks for ([`FeedSpec`], [`SortType`]).
//! - [`page_cache`]: fetched pages linked into chains, and the in-flight
//!   fetch guard.
//! - [`item_index`]: every confirmed item seen, for freshness checks and
//!   pending confirmation.
//! - [`sort`]: ordering, including relative scoring across sources.
//! - [`blocklist`], [`pending`]: the local user's blocks and publications.
//! - [`aggregator`]: per-feed state and the recompute pipeline.
//! - [`scheduler`]: dirty tracking and the recompute pre-check.
//! - [`engine`]: ties it together and runs the background work.

pub mod aggregator;
pub mod blocklist;
pub mod engine;
pub mod item_index;
pub mod page_cache;
pub mod pending;
pub mod scheduler;
pub mod sort;
pub mod spec;

pub use aggregator::{FeedPhase, FeedSnapshot, FeedStatus, MAX_FEED_ERRORS};
pub use engine::FeedEngine;
pub use spec::{FeedFilter, FeedKey, FeedSpec, SortType, TimeRange, INITIAL_PAGE_NUMBER};
