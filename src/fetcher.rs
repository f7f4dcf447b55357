use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ArchiveError, Result};

/// One feed entry as the parser reports it, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    /// Publisher name
    pub source: Option<String>,
}

/// Produces the entries of one feed. Malformed documents yield an empty list;
/// only transport failures are errors.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>>;
}

pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Parse a feed document. Anything feed-rs rejects becomes zero entries.
    pub fn parse_entries(bytes: &[u8]) -> Vec<RawEntry> {
        let parsed = match parser::parse(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Malformed feed document, treating as empty: {}", e);
                return Vec::new();
            }
        };

        // feed_rs doesn't expose the text of RSS <source> elements
        let sources = Self::extract_sources_from_xml(bytes);

        parsed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone());
                let source = link
                    .as_ref()
                    .and_then(|l| sources.get(l.trim()))
                    .cloned();
                let summary = entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body));

                RawEntry {
                    link,
                    title: entry.title.map(|t| t.content),
                    published: entry.published.map(|dt| dt.to_rfc3339()),
                    updated: entry.updated.map(|dt| dt.to_rfc3339()),
                    summary,
                    source,
                }
            })
            .collect()
    }

    /// Map each RSS item's <link> to the text of its <source> element
    pub fn extract_sources_from_xml(xml_bytes: &[u8]) -> HashMap<String, String> {
        let mut sources = HashMap::new();
        let xml_str = match std::str::from_utf8(xml_bytes) {
            Ok(s) => s,
            Err(_) => return sources,
        };

        for item_block in xml_str.split("<item").skip(1) {
            if !item_block.starts_with(|c: char| c == '>' || c.is_whitespace()) {
                continue;
            }
            let item_end = item_block.find("</item>").unwrap_or(item_block.len());
            let item = &item_block[..item_end];

            let link = Self::extract_xml_element(item, "link");
            let source = Self::extract_xml_element(item, "source");

            if let (Some(link), Some(source)) = (link, source) {
                if !link.is_empty() && !source.is_empty() {
                    sources.insert(link, source);
                }
            }
        }

        sources
    }

    /// Text of the first `<tag ...>text</tag>` in `xml`, attributes allowed.
    pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
        let open = format!("<{}", tag);
        let end_tag = format!("</{}>", tag);

        let mut search_from = 0;
        let start = loop {
            let pos = xml[search_from..].find(&open)? + search_from;
            let after = pos + open.len();
            let next = xml[after..].chars().next()?;
            if next == '>' || next.is_whitespace() {
                let close = xml[after..].find('>')? + after;
                if xml[..close].ends_with('/') {
                    return None;
                }
                break close + 1;
            }
            search_from = after;
        };
        let end = xml[start..].find(&end_tag)? + start;

        Some(decode_xml_text(xml[start..end].trim()))
    }
}

fn decode_xml_text(text: &str) -> String {
    let cdata = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"));
    match cdata {
        Some(inner) => inner.trim().to_string(),
        None => html_escape::decode_html_entities(text).to_string(),
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>> {
        info!("Fetching feed: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(ArchiveError::fetch(
                url,
                format!("HTTP status {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;

        let entries = Self::parse_entries(&bytes);
        info!("Parsed {} entries from {}", entries.len(), url);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GOOGLE_STYLE_RSS: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>"ai" - Google News</title>
                <link>https://news.google.com</link>
                <description>Google News</description>
                <item>
                    <title>First story - Daily Paper</title>
                    <link>https://news.example.com/story/1?oc=5</link>
                    <guid isPermaLink="false">story-1</guid>
                    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
                    <description>&lt;a href="https://news.example.com/story/1"&gt;First story&lt;/a&gt;&amp;nbsp;&amp;nbsp;&lt;font color="#6f6f6f"&gt;Daily Paper&lt;/font&gt;</description>
                    <source url="https://paper.example.com">Daily Paper</source>
                </item>
                <item>
                    <title>Second story</title>
                    <link>https://news.example.com/story/2</link>
                    <guid isPermaLink="false">story-2</guid>
                </item>
            </channel>
        </rss>
    "##;

    mod extract_xml_element_tests {
        use super::*;

        #[test]
        fn test_extract_simple_element() {
            let xml = "<title>Hello World</title>";
            let result = HttpFeedSource::extract_xml_element(xml, "title");
            assert_eq!(result, Some("Hello World".to_string()));
        }

        #[test]
        fn test_extract_element_with_attributes() {
            let xml = r#"<source url="https://bbc.co.uk">BBC News</source>"#;
            let result = HttpFeedSource::extract_xml_element(xml, "source");
            assert_eq!(result, Some("BBC News".to_string()));
        }

        #[test]
        fn test_prefix_tag_names_do_not_match() {
            let xml = "<linkage>wrong</linkage><link>right</link>";
            let result = HttpFeedSource::extract_xml_element(xml, "link");
            assert_eq!(result, Some("right".to_string()));
        }

        #[test]
        fn test_self_closing_element() {
            let xml = r#"<source url="https://x.com"/>"#;
            assert_eq!(HttpFeedSource::extract_xml_element(xml, "source"), None);
        }

        #[test]
        fn test_entities_and_cdata() {
            let xml = "<source>Ben &amp; Jerry&apos;s</source>";
            assert_eq!(
                HttpFeedSource::extract_xml_element(xml, "source"),
                Some("Ben & Jerry's".to_string())
            );

            let xml = "<source><![CDATA[ A & B ]]></source>";
            assert_eq!(
                HttpFeedSource::extract_xml_element(xml, "source"),
                Some("A & B".to_string())
            );
        }

        #[test]
        fn test_extract_element_not_found() {
            let xml = "<title>Hello</title>";
            assert_eq!(HttpFeedSource::extract_xml_element(xml, "link"), None);
        }

        #[test]
        fn test_extract_element_no_closing_tag() {
            let xml = "<title>Hello";
            assert_eq!(HttpFeedSource::extract_xml_element(xml, "title"), None);
        }
    }

    mod extract_sources_from_xml_tests {
        use super::*;

        #[test]
        fn test_maps_link_to_source() {
            let result = HttpFeedSource::extract_sources_from_xml(GOOGLE_STYLE_RSS.as_bytes());
            assert_eq!(result.len(), 1);
            assert_eq!(
                result.get("https://news.example.com/story/1?oc=5"),
                Some(&"Daily Paper".to_string())
            );
        }

        #[test]
        fn test_numeric_entities_in_publisher() {
            let xml = r#"<rss><channel><item>
                <link>https://x.com/a</link>
                <source url="https://x.com">Caf&#233; Times &#x26; Co</source>
            </item></channel></rss>"#;
            let result = HttpFeedSource::extract_sources_from_xml(xml.as_bytes());
            assert_eq!(result.get("https://x.com/a"), Some(&"Café Times & Co".to_string()));
        }

        #[test]
        fn test_escaped_ampersand_decodes_once() {
            let xml = "<source>A &amp;amp; B</source>";
            assert_eq!(
                HttpFeedSource::extract_xml_element(xml, "source"),
                Some("A &amp; B".to_string())
            );
        }

        #[test]
        fn test_invalid_utf8() {
            let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
            assert!(HttpFeedSource::extract_sources_from_xml(&invalid_bytes).is_empty());
        }

        #[test]
        fn test_no_items() {
            let xml = "<rss><channel><title>Empty</title></channel></rss>";
            assert!(HttpFeedSource::extract_sources_from_xml(xml.as_bytes()).is_empty());
        }
    }

    mod parse_entries_tests {
        use super::*;

        #[test]
        fn test_parse_google_style_feed() {
            let entries = HttpFeedSource::parse_entries(GOOGLE_STYLE_RSS.as_bytes());
            assert_eq!(entries.len(), 2);

            let first = &entries[0];
            assert_eq!(first.link.as_deref(), Some("https://news.example.com/story/1?oc=5"));
            assert_eq!(first.title.as_deref(), Some("First story - Daily Paper"));
            assert_eq!(first.source.as_deref(), Some("Daily Paper"));
            assert!(first.published.is_some());
            assert!(first.summary.as_deref().unwrap_or_default().contains("First story"));

            let second = &entries[1];
            assert_eq!(second.link.as_deref(), Some("https://news.example.com/story/2"));
            assert_eq!(second.source, None);
            assert_eq!(second.published, None);
        }

        #[test]
        fn test_feed_order_is_preserved() {
            let entries = HttpFeedSource::parse_entries(GOOGLE_STYLE_RSS.as_bytes());
            let links: Vec<_> = entries.iter().filter_map(|e| e.link.clone()).collect();
            assert_eq!(
                links,
                vec![
                    "https://news.example.com/story/1?oc=5".to_string(),
                    "https://news.example.com/story/2".to_string()
                ]
            );
        }

        #[test]
        fn test_malformed_document_is_empty() {
            assert!(HttpFeedSource::parse_entries(b"this is not a feed").is_empty());
            assert!(HttpFeedSource::parse_entries(b"").is_empty());
        }

        #[test]
        fn test_atom_feed() {
            let atom = r#"<?xml version="1.0" encoding="utf-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Atom</title>
                    <id>urn:feed</id>
                    <updated>2024-02-01T10:00:00Z</updated>
                    <entry>
                        <title>Atom entry</title>
                        <id>urn:entry:1</id>
                        <link href="https://atom.example.com/1"/>
                        <updated>2024-02-01T10:00:00Z</updated>
                        <summary>Short &lt;b&gt;summary&lt;/b&gt;</summary>
                    </entry>
                </feed>
            "#;
            let entries = HttpFeedSource::parse_entries(atom.as_bytes());
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].link.as_deref(), Some("https://atom.example.com/1"));
            assert!(entries[0].updated.is_some());
            assert!(entries[0].summary.is_some());
        }
    }

    mod http_tests {
        use super::*;

        #[tokio::test]
        async fn test_fetch_from_server() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rss/search"))
                .and(query_param("q", "ai"))
                .respond_with(ResponseTemplate::new(200).set_body_string(GOOGLE_STYLE_RSS))
                .mount(&server)
                .await;

            let source = HttpFeedSource::new(&Config::default()).unwrap();
            let url = format!("{}/rss/search?q=ai", server.uri());
            let entries = source.fetch(&url).await.unwrap();
            assert_eq!(entries.len(), 2);
        }

        #[tokio::test]
        async fn test_client_sends_configured_user_agent() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(header("user-agent", "keyword-news-test/1.0"))
                .respond_with(ResponseTemplate::new(200).set_body_string(GOOGLE_STYLE_RSS))
                .expect(1)
                .mount(&server)
                .await;

            let config = Config {
                user_agent: "keyword-news-test/1.0".to_string(),
                ..Config::default()
            };
            let source = HttpFeedSource::new(&config).unwrap();
            let entries = source.fetch(&format!("{}/rss", server.uri())).await.unwrap();
            assert_eq!(entries.len(), 2);
        }

        #[tokio::test]
        async fn test_http_error_status_is_fetch_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let source = HttpFeedSource::new(&Config::default()).unwrap();
            let result = source.fetch(&format!("{}/rss", server.uri())).await;
            assert!(matches!(result, Err(ArchiveError::Fetch { .. })));
        }

        #[tokio::test]
        async fn test_garbage_body_is_empty_not_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .mount(&server)
                .await;

            let source = HttpFeedSource::new(&Config::default()).unwrap();
            let entries = source.fetch(&format!("{}/rss", server.uri())).await.unwrap();
            assert!(entries.is_empty());
        }
    }
}
