//! Feed ordering.
//!
//! Every function here is a pure function of its input list, so recomputing
//! a feed from the same candidates always yields the same order.
//!
//! The ranked families (`hot`, `top`, `controversial`) divide each item's
//! score by the total score of its own source.  Without that, one busy
//! source would bury every quieter source in a merged feed.

use std::collections::HashMap;

use super::SortType;
use crate::source::{Item, SourceAddress};

/// Zero point of the hot ranking's age term (Unix seconds).
pub const HOT_EPOCH: i64 = 1_134_028_003;

/// Seconds of age worth one order of magnitude of votes.
const HOT_AGE_DIVISOR: f64 = 45_000.0;

/// Order `items` for `sort`.
pub fn sort_items(items: Vec<Item>, sort: SortType) -> Vec<Item> {
    match sort {
        SortType::New => sort_by_new(items),
        SortType::Hot => sort_by_relative_score(items, hot_score),
        SortType::Top(_) => sort_by_relative_score(items, top_score),
        SortType::Controversial(_) => sort_by_relative_score(items, controversial_score),
    }
}

/// Newest first; identical timestamps fall back to the item key.
pub fn sort_by_new(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.key().cmp(&b.key()))
    });
    items
}

/// Reddit-style hot score, rounded to 7 decimals.
pub fn hot_score(item: &Item) -> f64 {
    let score = item.score();
    let order = (score.max(1) as f64).log10();
    let sign = score.signum() as f64;
    let age = (item.timestamp - HOT_EPOCH) as f64;
    round7(sign * order + age / HOT_AGE_DIVISOR)
}

pub fn top_score(item: &Item) -> f64 {
    item.score() as f64
}

/// Many votes split evenly score highest.
pub fn controversial_score(item: &Item) -> f64 {
    let up = item.upvote_count as f64;
    let down = item.downvote_count as f64;
    let magnitude = up + down;
    let balance = if item.upvote_count == 0 || item.downvote_count == 0 {
        0.0
    } else {
        up.min(down) / up.max(down)
    };
    magnitude.powf(balance)
}

fn round7(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

/// Each item's score divided by the sum of its source's scores (at least 1).
pub fn relative_scores(items: &[Item], score: impl Fn(&Item) -> f64) -> Vec<f64> {
    let raw: Vec<f64> = items.iter().map(&score).collect();
    let mut totals: HashMap<&SourceAddress, f64> = HashMap::new();
    for (item, value) in items.iter().zip(&raw) {
        *totals.entry(&item.source).or_insert(0.0) += value;
    }
    items
        .iter()
        .zip(raw)
        .map(|(item, value)| value / totals[&item.source].max(1.0))
        .collect()
}

/// Relative score desc, then timestamp desc, then upvotes desc, then key.
fn sort_by_relative_score(items: Vec<Item>, score: impl Fn(&Item) -> f64) -> Vec<Item> {
    let scores = relative_scores(&items, score);
    let mut ranked: Vec<(f64, Item)> = scores.into_iter().zip(items).collect();
    ranked.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| b.upvote_count.cmp(&a.upvote_count))
            .then_with(|| a.key().cmp(&b.key()))
    });
    ranked.into_iter().map(|(_, item)| item).collect()
}
