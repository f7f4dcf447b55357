use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::fetcher::RawEntry;

/// Fallback name when a keyword has no filesystem-safe characters at all
pub const SAFE_NAME_PLACEHOLDER: &str = "kw";
const SAFE_NAME_MAX_CHARS: usize = 60;
const ID_HEX_LEN: usize = 16;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One collected article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub keyword: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source: String,
    pub published_at: String,
    pub date: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub collected_at: String,
}

impl Item {
    /// Build an item from a raw feed entry. Returns `None` when the entry has
    /// no usable link.
    pub fn from_entry(
        entry: &RawEntry,
        keyword: &str,
        now: DateTime<Utc>,
        snippet_max_chars: usize,
    ) -> Option<Item> {
        let url = normalize_url(entry.link.as_deref().unwrap_or_default());
        if url.is_empty() {
            return None;
        }

        let published = resolve_published(
            entry.published.as_deref(),
            entry.updated.as_deref(),
            now,
        );

        Some(Item {
            id: item_id(&url),
            keyword: keyword.to_string(),
            title: entry.title.as_deref().unwrap_or_default().trim().to_string(),
            url,
            source: entry.source.as_deref().unwrap_or_default().trim().to_string(),
            published_at: format_timestamp(published),
            date: published.date_naive().to_string(),
            snippet: clean_snippet(entry.summary.as_deref(), snippet_max_chars),
            collected_at: format_timestamp(now),
        })
    }
}

/// Trim and drop everything from the first `?` or `#` onward.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    trimmed[..end].to_string()
}

/// First 16 hex characters of the SHA-256 digest of the normalized URL.
pub fn item_id(normalized_url: &str) -> String {
    use std::fmt::Write as _;

    let digest = Sha256::digest(normalized_url.as_bytes());
    let mut out = String::with_capacity(ID_HEX_LEN);
    for b in digest.iter().take(ID_HEX_LEN / 2) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// RFC 3339 with whole seconds and a `+00:00` offset, so the string sorts
/// the same way the instant does.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Lenient parse of the date formats feeds actually emit. Values without a
/// zone are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `published`, then `updated`, then `now`. A present but unparseable value
/// is logged and treated as missing.
pub fn resolve_published(
    published: Option<&str>,
    updated: Option<&str>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    for (field, value) in [("published", published), ("updated", updated)] {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        match parse_timestamp(value) {
            Some(dt) => return dt,
            None => warn!("Unparseable {} timestamp '{}', trying next", field, value),
        }
    }
    now
}

/// Strip tags, collapse whitespace, trim and cap at `max_chars` characters.
/// Entities are left as written.
pub fn clean_snippet(summary: Option<&str>, max_chars: usize) -> String {
    let Some(summary) = summary else {
        return String::new();
    };
    let stripped = TAG_RE.replace_all(summary, "");
    let collapsed = WHITESPACE_RE.replace_all(stripped.trim(), " ");
    collapsed.chars().take(max_chars).collect()
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Filesystem-safe name shared by partition files and keyword pages.
pub fn safe_name(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    let mut in_run = false;
    for c in keyword.chars() {
        if is_safe_char(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    let name: String = out
        .trim_matches('_')
        .chars()
        .take(SAFE_NAME_MAX_CHARS)
        .collect();

    if name.is_empty() {
        SAFE_NAME_PLACEHOLDER.to_string()
    } else {
        name
    }
}
