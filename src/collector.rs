use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::FeedSource;
use crate::item::{normalize_url, Item};
use crate::sources::sources_for_keyword;
use crate::store::{known_urls, ItemStore};

/// Outcome of one collector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Ids in the store after the run that were not there before it
    pub new_items: usize,
    pub total: usize,
    /// Entries skipped because their URL was already stored
    pub skipped_known: usize,
    /// (keyword, feed) pairs whose fetch failed
    pub failed_sources: usize,
}

impl std::fmt::Display for CollectReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "done. new items: {}, total: {}", self.new_items, self.total)
    }
}

pub struct Collector<'a, S: FeedSource + ?Sized> {
    config: &'a Config,
    source: &'a S,
    store: ItemStore,
}

impl<'a, S: FeedSource + ?Sized> Collector<'a, S> {
    pub fn new(config: &'a Config, source: &'a S) -> Self {
        Self {
            config,
            source,
            store: ItemStore::new(config),
        }
    }

    pub async fn run(&self, keywords: &[String]) -> Result<CollectReport> {
        self.run_at(keywords, Utc::now()).await
    }

    /// Run with an explicit collection time, used for `collectedAt` and as
    /// the publish time of entries that carry none.
    pub async fn run_at(&self, keywords: &[String], now: DateTime<Utc>) -> Result<CollectReport> {
        let existing = self.store.load().await?;
        let before: HashSet<String> = existing.iter().map(|it| it.id.clone()).collect();
        // Snapshot before fetching; items gathered this run do not extend it
        let known = known_urls(&existing);

        let mut report = CollectReport::default();
        let mut fresh: Vec<Item> = Vec::new();

        for keyword in keywords {
            for feed_url in sources_for_keyword(keyword, &self.config.feed) {
                let entries = match self.source.fetch(&feed_url).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        error!("Failed to fetch feed for '{}': {}", keyword, e);
                        report.failed_sources += 1;
                        continue;
                    }
                };

                let mut added = 0;
                for entry in entries.iter().take(self.config.per_source_limit) {
                    let url = normalize_url(entry.link.as_deref().unwrap_or_default());
                    if url.is_empty() {
                        warn!("Skipping entry with no link for '{}'", keyword);
                        continue;
                    }
                    if known.contains(&url) {
                        report.skipped_known += 1;
                        continue;
                    }
                    if let Some(item) =
                        Item::from_entry(entry, keyword, now, self.config.snippet_max_chars)
                    {
                        fresh.push(item);
                        added += 1;
                    }
                }
                info!("Collected {} new entries for '{}'", added, keyword);
            }
        }

        let merged = ItemStore::merge(existing, fresh);
        self.store.persist(&merged).await?;

        report.total = merged.len();
        report.new_items = merged.iter().filter(|it| !before.contains(&it.id)).count();
        Ok(report)
    }
}
