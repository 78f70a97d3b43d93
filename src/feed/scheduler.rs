//! Recompute coalescing.
//!
//! Upstream events (a page arriving, a blocklist edit, a publication) mark
//! the feeds they concern as dirty.  The first mark of a burst asks the
//! engine to schedule a flush; further marks before that flush runs are
//! absorbed.  At flush time each dirty feed compares a [`Fingerprint`] of
//! its inputs with the one from its last recompute and is skipped when
//! nothing it depends on moved.

use std::collections::BTreeSet;

use super::page_cache::ChainSignature;

/// Everything a feed's recompute reads, reduced to cheap comparable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub chains: Vec<ChainSignature>,
    pub blocklist: u64,
    pub pending: u64,
    pub index: u64,
    pub page_number: usize,
    pub errors: u64,
    pub cutoff: Option<i64>,
}

#[derive(Debug, Default)]
pub struct RecomputeScheduler {
    dirty: BTreeSet<String>,
    flush_pending: bool,
}

impl RecomputeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a feed dirty.  Returns `true` when the caller must schedule a
    /// flush, `false` when one is already pending.
    pub fn mark(&mut self, feed: &str) -> bool {
        self.dirty.insert(feed.to_string());
        if self.flush_pending {
            return false;
        }
        self.flush_pending = true;
        true
    }

    /// Drain the dirty set for a flush, in name order.
    pub fn take(&mut self) -> Vec<String> {
        self.flush_pending = false;
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn forget(&mut self, feed: &str) {
        self.dirty.remove(feed);
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending
    }

    pub fn is_dirty(&self, feed: &str) -> bool {
        self.dirty.contains(feed)
    }
}
