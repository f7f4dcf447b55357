use url::form_urlencoded;

use crate::config::FeedConfig;

/// Search-feed URL for a keyword. Spaces encode as `+`.
pub fn google_news_rss(keyword: &str, feed: &FeedConfig) -> String {
    let query: String = form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    format!(
        "{}?q={}&hl={}&gl={}&ceid={}",
        feed.base_url, query, feed.hl, feed.gl, feed.ceid
    )
}

/// Feed URLs consulted for a keyword, in fetch order.
pub fn sources_for_keyword(keyword: &str, feed: &FeedConfig) -> Vec<String> {
    vec![google_news_rss(keyword, feed)]
}
