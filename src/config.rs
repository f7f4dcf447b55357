use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Base directory every relative path below is resolved against
    pub root: PathBuf,
    pub keywords_file: PathBuf,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Raw entries considered per (keyword, feed) pair per run
    pub per_source_limit: usize,
    /// Most recent items that feed the by-date and by-keyword partitions
    pub partition_window: usize,
    pub index_limit: usize,
    pub keyword_page_limit: usize,
    pub snippet_max_chars: usize,
    /// HTTP timeout in seconds
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub feed: FeedConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub hl: String,
    pub gl: String,
    pub ceid: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub lang: String,
    /// URL prefix for every internal link, e.g. "/" or "/news/"
    pub base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            keywords_file: PathBuf::from("keywords.txt"),
            data_dir: PathBuf::from("data"),
            public_dir: PathBuf::from("public"),
            per_source_limit: 50,
            partition_window: 1000,
            index_limit: 80,
            keyword_page_limit: 200,
            snippet_max_chars: 240,
            fetch_timeout_secs: 30,
            user_agent: "KeywordNews/0.1 (Feed Archiver)".to_string(),
            feed: FeedConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://news.google.com/rss/search".to_string(),
            hl: "ko".to_string(),
            gl: "KR".to_string(),
            ceid: "KR:ko".to_string(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Keyword News Archive".to_string(),
            description: "Keyword news archive".to_string(),
            lang: "ko".to_string(),
            base_path: "/".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
        Self::from_str(&content)
    }

    /// Load the config file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Config rooted at `root` with every other setting at its default
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn keywords_path(&self) -> PathBuf {
        self.resolve(&self.keywords_file)
    }

    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    pub fn items_path(&self) -> PathBuf {
        self.data_path().join("items.json")
    }

    pub fn by_date_dir(&self) -> PathBuf {
        self.data_path().join("by-date")
    }

    pub fn by_keyword_dir(&self) -> PathBuf {
        self.data_path().join("by-keyword")
    }

    pub fn public_path(&self) -> PathBuf {
        self.resolve(&self.public_dir)
    }

    pub fn keyword_pages_dir(&self) -> PathBuf {
        self.public_path().join("k")
    }

    pub fn load_keywords(&self) -> Result<Vec<String>> {
        load_keywords(self.keywords_path())
    }
}

/// Read the keyword list: one keyword per line, blank lines and `#` comments
/// ignored, order preserved. A missing file is fatal.
pub fn load_keywords<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArchiveError::KeywordsMissing(path.to_path_buf()))
        }
        Err(e) => return Err(ArchiveError::io(path, e)),
    };
    Ok(parse_keywords(&content))
}

pub fn parse_keywords(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}
