use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;

use crate::config::{FeedConfig, SortKey};
use crate::error::Result;
use crate::models::FeedEntry;

pub struct FeedFetcher {
    client: Client,
    // Separate client for feeds configured with `verify = false`.
    insecure_client: Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout, false),
            insecure_client: build_client(timeout, true),
        }
    }

    pub async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<FeedEntry>> {
        let client = if feed.verify {
            &self.client
        } else {
            &self.insecure_client
        };

        let response = client.get(&feed.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_entries(&bytes)
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("rss2raindrop/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .expect("Failed to create HTTP client")
}

/// Maps parsed feed entries into [`FeedEntry`] values. Entries without a
/// link are dropped: they can be neither submitted nor deduplicated.
fn parse_entries(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                tracing::debug!("Skipping entry without a link: {}", entry.id);
                return None;
            };
            Some(FeedEntry {
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Untitled".to_string()),
                link,
                published: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(entries)
}

/// Orders entries newest-first by the feed's configured sort key. When the
/// publication time is missing on any entry, the feed's natural order is
/// kept instead.
pub fn sort_entries(entries: &mut [FeedEntry], sort_key: SortKey, feed_url: &str) {
    match sort_key {
        SortKey::Published => {
            if entries.iter().all(|entry| entry.published.is_some()) {
                entries.sort_by(|a, b| b.published.cmp(&a.published));
            } else if !entries.is_empty() {
                tracing::warn!("Feed entries have no publication time: {}", feed_url);
            }
        }
        SortKey::Link => {
            entries.sort_by(|a, b| b.link.cmp(&a.link));
        }
    }
}
