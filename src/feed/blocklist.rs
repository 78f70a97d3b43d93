//! Addresses and items the local user chose not to see.
//!
//! An address may be a source or an author.  A blocked source drops every
//! item listed in it; a blocked author or cid drops single items.  Every
//! effective change bumps the version, which feeds the recompute pre-check.

use std::collections::HashSet;

use crate::source::{Cid, Item, SourceAddress};

#[derive(Debug, Default)]
pub struct Blocklist {
    addresses: HashSet<String>,
    cids: HashSet<Cid>,
    version: u64,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the address was not blocked before.
    pub fn block_address(&mut self, address: &str) -> bool {
        let changed = self.addresses.insert(address.to_string());
        self.bump(changed)
    }

    pub fn unblock_address(&mut self, address: &str) -> bool {
        let changed = self.addresses.remove(address);
        self.bump(changed)
    }

    pub fn block_cid(&mut self, cid: &Cid) -> bool {
        let changed = self.cids.insert(cid.clone());
        self.bump(changed)
    }

    pub fn unblock_cid(&mut self, cid: &Cid) -> bool {
        let changed = self.cids.remove(cid);
        self.bump(changed)
    }

    fn bump(&mut self, changed: bool) -> bool {
        if changed {
            self.version += 1;
        }
        changed
    }

    pub fn is_source_blocked(&self, source: &SourceAddress) -> bool {
        self.addresses.contains(source.as_str())
    }

    /// Blocked by cid or by author address.
    pub fn is_item_blocked(&self, item: &Item) -> bool {
        item.cid.as_ref().is_some_and(|cid| self.cids.contains(cid))
            || self.addresses.contains(&item.author_address)
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
