//! Feed specifications: what a caller asks the engine to show.
//!
//! A [`FeedSpec`] names a set of sources, a [`SortType`], an optional filter
//! and cutoff, and the page size.  Everything except `page_number` makes up
//! the feed's identity ([`FeedKey`]); paging through a feed never creates a
//! new one.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FeedError, FeedResult};
use crate::source::{Item, SourceAddress};

/// The page number a fresh or reset feed starts at.
pub const INITIAL_PAGE_NUMBER: usize = 1;

/// Listing window for the ranked sort families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeRange {
    const ALL: [TimeRange; 6] = [
        TimeRange::Hour,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
        TimeRange::Year,
        TimeRange::All,
    ];

    fn suffix(self) -> &'static str {
        match self {
            TimeRange::Hour => "Hour",
            TimeRange::Day => "Day",
            TimeRange::Week => "Week",
            TimeRange::Month => "Month",
            TimeRange::Year => "Year",
            TimeRange::All => "All",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|range| range.suffix() == suffix)
    }
}

/// How a feed is ordered.
///
/// The time range only selects which listing the provider serves; the
/// ranking algorithm is the same within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortType {
    New,
    Hot,
    Top(TimeRange),
    Controversial(TimeRange),
}

impl SortType {
    /// The sort modes a front end can cycle through.
    pub const CYCLE: [SortType; 4] = [
        SortType::Hot,
        SortType::New,
        SortType::Top(TimeRange::All),
        SortType::Controversial(TimeRange::All),
    ];

    /// The next mode in [`SortType::CYCLE`].
    pub fn next(self) -> SortType {
        let position = Self::CYCLE.iter().position(|sort| *sort == self).unwrap_or(0);
        Self::CYCLE[(position + 1) % Self::CYCLE.len()]
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortType::New => f.write_str("new"),
            SortType::Hot => f.write_str("hot"),
            SortType::Top(range) => write!(f, "top{}", range.suffix()),
            SortType::Controversial(range) => write!(f, "controversial{}", range.suffix()),
        }
    }
}

impl FromStr for SortType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => return Ok(SortType::New),
            "hot" => return Ok(SortType::Hot),
            "top" => return Ok(SortType::Top(TimeRange::All)),
            "controversial" => return Ok(SortType::Controversial(TimeRange::All)),
            _ => {}
        }
        if let Some(range) = s.strip_prefix("top").and_then(TimeRange::from_suffix) {
            return Ok(SortType::Top(range));
        }
        if let Some(range) = s
            .strip_prefix("controversial")
            .and_then(TimeRange::from_suffix)
        {
            return Ok(SortType::Controversial(range));
        }
        Err(FeedError::UnknownSort(s.to_string()))
    }
}

/// A caller-supplied item predicate.
///
/// Closures cannot be compared, so every filter carries a key.  Two filters
/// with the same key are treated as the same filter when deciding feed
/// identity.
#[derive(Clone)]
pub struct FeedFilter {
    key: String,
    predicate: Arc<dyn Fn(&Item) -> bool + Send + Sync>,
}

impl FeedFilter {
    pub fn new(key: impl Into<String>, predicate: impl Fn(&Item) -> bool + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, item: &Item) -> bool {
        (self.predicate)(item)
    }
}

impl fmt::Debug for FeedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedFilter").field("key", &self.key).finish()
    }
}

/// Everything a caller declares about a feed.
#[derive(Debug, Clone)]
pub struct FeedSpec {
    pub sources: Vec<SourceAddress>,
    pub sort: SortType,
    pub filter: Option<FeedFilter>,
    /// Only items authored within this many seconds of now.
    pub newer_than: Option<i64>,
    pub page_size: usize,
    pub page_number: usize,
}

impl FeedSpec {
    pub fn new(sources: Vec<SourceAddress>, sort: SortType, page_size: usize) -> Self {
        Self {
            sources,
            sort,
            filter: None,
            newer_than: None,
            page_size,
            page_number: INITIAL_PAGE_NUMBER,
        }
    }

    pub fn with_filter(mut self, filter: FeedFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_newer_than(mut self, seconds: i64) -> Self {
        self.newer_than = Some(seconds);
        self
    }

    /// Reject specs that can never produce a sensible feed.
    pub fn validate(&self) -> FeedResult<()> {
        if self.sources.is_empty() {
            return Err(FeedError::InvalidSpec("a feed needs at least one source".into()));
        }
        if self.page_size == 0 {
            return Err(FeedError::InvalidSpec("page size must be positive".into()));
        }
        if self.page_number < INITIAL_PAGE_NUMBER {
            return Err(FeedError::InvalidSpec(format!(
                "page number must be at least {INITIAL_PAGE_NUMBER}"
            )));
        }
        if matches!(self.newer_than, Some(seconds) if seconds <= 0) {
            return Err(FeedError::InvalidSpec("newer-than cutoff must be positive".into()));
        }
        let unique: BTreeSet<_> = self.sources.iter().collect();
        if unique.len() != self.sources.len() {
            return Err(FeedError::InvalidSpec("duplicate source".into()));
        }
        Ok(())
    }

    /// Identity of the feed: every field except `page_number`.
    pub fn key(&self) -> FeedKey {
        FeedKey {
            sources: self.sources.iter().cloned().collect(),
            sort: self.sort,
            filter: self.filter.as_ref().map(|f| f.key().to_string()),
            newer_than: self.newer_than,
            page_size: self.page_size,
        }
    }

    pub fn is_multi_source(&self) -> bool {
        self.sources.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub sources: BTreeSet<SourceAddress>,
    pub sort: SortType,
    pub filter: Option<String>,
    pub newer_than: Option<i64>,
    pub page_size: usize,
}
