//! RSS content provider.
//!
//! This module shows how to implement the [`ContentProvider`] trait for a
//! concrete network.  Use it as a template when adding support for Atom,
//! JSON Feed, or a content-addressed protocol.
//!
//! An RSS feed URL is a source.  RSS has no server-side pagination or sort
//! listings, so every sort maps to the same single page: the channel itself,
//! with no next pointer.  The engine does the sorting and paging.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::DateTime;

use super::{Cid, ContentProvider, Item, Page, PagePointer, SourceAddress};
use crate::feed::SortType;

/// Fetches and parses RSS 2.0 feeds over HTTP using the [`rss`] crate.
#[derive(Debug)]
pub struct RssProvider {
    client: reqwest::Client,
    account: String,
}

impl RssProvider {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            account: account.into(),
        }
    }

    /// Convert an already-fetched [`rss::Channel`] into a [`Page`].
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.
    pub fn parse_channel(channel: &rss::Channel, source: &SourceAddress) -> Page {
        let items = channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <guid>, fall back to <link>.  Items with neither have
                // no identity and are dropped by the aggregator.
                let cid = item
                    .guid()
                    .map(|g| g.value().to_string())
                    .or_else(|| item.link().map(String::from))
                    .map(Cid);

                // Undated items get the epoch and sink to the bottom of `new`.
                let timestamp = item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|dt| dt.timestamp())
                    .unwrap_or(0);

                Item {
                    cid,
                    source: source.clone(),
                    author_address: item.author().unwrap_or(channel.title()).to_string(),
                    timestamp,
                    updated_at: None,
                    upvote_count: 0,
                    downvote_count: 0,
                    reply_count: 0,
                    pinned: false,
                    title: Some(item.title().unwrap_or("(untitled)").to_string()),
                    content: item.description().map(String::from),
                    link: item.link().map(String::from),
                    pending: false,
                }
            })
            .collect();

        Page {
            items,
            next_page: None,
        }
    }
}

#[async_trait]
impl ContentProvider for RssProvider {
    fn account(&self) -> &str {
        &self.account
    }

    async fn first_page_pointer(
        &self,
        source: &SourceAddress,
        _sort: SortType,
    ) -> Result<Option<PagePointer>> {
        Ok(Some(PagePointer::new(source.as_str())))
    }

    async fn fetch_page(
        &self,
        source: &SourceAddress,
        _sort: SortType,
        pointer: &PagePointer,
    ) -> Result<Page> {
        let body = self
            .client
            .get(pointer.as_str())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let channel = rss::Channel::read_from(body.as_ref())?;
        Ok(Self::parse_channel(&channel, source))
    }

    async fn publish(&self, item: &Item) -> Result<Option<Cid>> {
        bail!("{} is an RSS feed and does not accept publications", item.source)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
