use std::path::Path;

use askama::Template;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;
use tracing::info;

use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::item::{safe_name, Item};
use crate::store::load_items;

const STYLESHEET: &str = include_str!("../static/style.css");

/// Fields shared by every page through `base.html`
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub lang: String,
    pub brand: String,
    pub base_path: String,
    pub updated: String,
}

pub struct KeywordLink {
    pub name: String,
    pub href: String,
}

pub struct IndexEntry<'a> {
    pub item: &'a Item,
    pub keyword_href: String,
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub meta: PageMeta,
    pub keywords: Vec<KeywordLink>,
    pub items: Vec<IndexEntry<'a>>,
}

#[derive(Template)]
#[template(path = "keyword.html")]
pub struct KeywordTemplate<'a> {
    pub meta: PageMeta,
    pub keyword: &'a str,
    pub items: Vec<&'a Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReport {
    pub index_items: usize,
    pub keyword_pages: usize,
}

impl std::fmt::Display for SiteReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "site built: {} keyword pages", self.keyword_pages)
    }
}

pub struct SiteRenderer<'a> {
    config: &'a Config,
    base_path: String,
}

impl<'a> SiteRenderer<'a> {
    pub fn new(config: &'a Config) -> Self {
        let mut base_path = config.site.base_path.clone();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Self { config, base_path }
    }

    pub fn keyword_href(&self, keyword: &str) -> String {
        format!("{}k/{}.html", self.base_path, safe_name(keyword))
    }

    fn meta(&self, title: String, description: String, updated: DateTime<Utc>) -> PageMeta {
        PageMeta {
            title,
            description,
            lang: self.config.site.lang.clone(),
            brand: self.config.site.title.clone(),
            base_path: self.base_path.clone(),
            updated: updated.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Latest items plus a pill for every configured keyword. `items` must
    /// already be sorted newest first.
    pub fn render_index(
        &self,
        items: &[Item],
        keywords: &[String],
        updated: DateTime<Utc>,
    ) -> Result<String> {
        let template = IndexTemplate {
            meta: self.meta(
                self.config.site.title.clone(),
                self.config.site.description.clone(),
                updated,
            ),
            keywords: keywords
                .iter()
                .map(|k| KeywordLink {
                    name: k.clone(),
                    href: self.keyword_href(k),
                })
                .collect(),
            items: items
                .iter()
                .take(self.config.index_limit)
                .map(|item| IndexEntry {
                    item,
                    keyword_href: self.keyword_href(&item.keyword),
                })
                .collect(),
        };
        Ok(template.render()?)
    }

    /// Items whose keyword matches exactly, in collection order.
    pub fn render_keyword_page(
        &self,
        keyword: &str,
        items: &[Item],
        updated: DateTime<Utc>,
    ) -> Result<String> {
        let template = KeywordTemplate {
            meta: self.meta(
                format!("#{} - {}", keyword, self.config.site.title),
                format!("{} - {}", keyword, self.config.site.description),
                updated,
            ),
            keyword,
            items: items
                .iter()
                .filter(|item| item.keyword == keyword)
                .take(self.config.keyword_page_limit)
                .collect(),
        };
        Ok(template.render()?)
    }

    /// Write `index.html`, `style.css` and one page per keyword.
    pub async fn build(
        &self,
        items: &[Item],
        keywords: &[String],
        updated: DateTime<Utc>,
    ) -> Result<SiteReport> {
        let public_dir = self.config.public_path();
        let pages_dir = self.config.keyword_pages_dir();
        fs::create_dir_all(&pages_dir)
            .await
            .map_err(|e| ArchiveError::io(&pages_dir, e))?;

        let index = self.render_index(items, keywords, updated)?;
        write_page(&public_dir.join("index.html"), index).await?;
        write_page(&public_dir.join("style.css"), STYLESHEET.to_string()).await?;

        for keyword in keywords {
            let page = self.render_keyword_page(keyword, items, updated)?;
            let path = pages_dir.join(format!("{}.html", safe_name(keyword)));
            write_page(&path, page).await?;
        }

        let report = SiteReport {
            index_items: items.len().min(self.config.index_limit),
            keyword_pages: keywords.len(),
        };
        info!(
            "Rendered index with {} items and {} keyword pages into {}",
            report.index_items,
            report.keyword_pages,
            public_dir.display()
        );
        Ok(report)
    }
}

/// Render the site from what is currently persisted.
pub async fn build_site(config: &Config) -> Result<SiteReport> {
    let keywords = config.load_keywords()?;
    let items = load_items(&config.items_path()).await?;
    SiteRenderer::new(config)
        .build(&items, &keywords, Utc::now())
        .await
}

async fn write_page(path: &Path, content: String) -> Result<()> {
    fs::write(path, content)
        .await
        .map_err(|e| ArchiveError::io(path, e))
}
