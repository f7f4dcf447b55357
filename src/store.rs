use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::item::{normalize_url, safe_name, Item};

/// The full item collection plus its date and keyword partitions, kept as
/// pretty-printed JSON files.
pub struct ItemStore {
    items_path: PathBuf,
    by_date_dir: PathBuf,
    by_keyword_dir: PathBuf,
    partition_window: usize,
}

impl ItemStore {
    pub fn new(config: &Config) -> Self {
        Self {
            items_path: config.items_path(),
            by_date_dir: config.by_date_dir(),
            by_keyword_dir: config.by_keyword_dir(),
            partition_window: config.partition_window,
        }
    }

    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    /// Load the full collection. A missing file is an empty collection.
    pub async fn load(&self) -> Result<Vec<Item>> {
        load_items(&self.items_path).await
    }

    /// Seed by id from `existing`, overwrite with `new` in order, then sort
    /// newest first. Overwritten ids keep their original position before the
    /// sort, so ties stay in merge order.
    pub fn merge(existing: Vec<Item>, new: Vec<Item>) -> Vec<Item> {
        let mut merged: Vec<Item> = Vec::with_capacity(existing.len() + new.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for item in existing.into_iter().chain(new) {
            match positions.get(&item.id) {
                Some(&pos) => merged[pos] = item,
                None => {
                    positions.insert(item.id.clone(), merged.len());
                    merged.push(item);
                }
            }
        }

        sort_newest_first(&mut merged);
        merged
    }

    /// Replace the full collection file and rewrite every partition file
    /// derived from the most recent `partition_window` items.
    pub async fn persist(&self, items: &[Item]) -> Result<()> {
        for dir in [&self.by_date_dir, &self.by_keyword_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| ArchiveError::io(dir, e))?;
        }

        write_json(&self.items_path, &items).await?;
        info!("Wrote {} items to {}", items.len(), self.items_path.display());

        let by_date = partition_by_date(items, self.partition_window);
        for (date, group) in &by_date {
            let path = self.by_date_dir.join(format!("{}.json", date));
            write_json(&path, group).await?;
        }

        let by_keyword = partition_by_keyword(items, self.partition_window);
        for (name, group) in &by_keyword {
            let path = self.by_keyword_dir.join(format!("{}.json", name));
            write_json(&path, group).await?;
        }

        debug!(
            "Wrote {} date partitions and {} keyword partitions",
            by_date.len(),
            by_keyword.len()
        );
        Ok(())
    }
}

pub async fn load_items(path: &Path) -> Result<Vec<Item>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArchiveError::io(path, e)),
    };
    serde_json::from_str(&content).map_err(|e| ArchiveError::json(path, e))
}

/// Normalized URLs already present, taken once before a run starts.
pub fn known_urls(items: &[Item]) -> HashSet<String> {
    items.iter().map(|it| normalize_url(&it.url)).collect()
}

/// Stable sort by `publishedAt` descending. The timestamps are fixed-width
/// UTC strings so byte order is time order.
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Most recent `window` items grouped by calendar date, each group in
/// collection order.
pub fn partition_by_date(items: &[Item], window: usize) -> BTreeMap<String, Vec<Item>> {
    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items.iter().take(window) {
        groups.entry(item.date.clone()).or_default().push(item.clone());
    }
    groups
}

/// Most recent `window` items grouped by the filesystem-safe name of their
/// keyword. Keywords sharing a safe name share a group.
pub fn partition_by_keyword(items: &[Item], window: usize) -> BTreeMap<String, Vec<Item>> {
    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items.iter().take(window) {
        groups
            .entry(safe_name(&item.keyword))
            .or_default()
            .push(item.clone());
    }
    groups
}

/// Serialize to a sibling temp file and rename it over `path`.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ArchiveError::json(path, e))?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)
        .await
        .map_err(|e| ArchiveError::io(&temp_path, e))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| ArchiveError::io(path, e))?;
    Ok(())
}
