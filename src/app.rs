use chrono::{DateTime, Utc};

use crate::config::{Config, FeedConfig};
use crate::db::{Ledger, LedgerStore};
use crate::error::{AppError, Result};
use crate::feed::{sort_entries, FeedFetcher};
use crate::services::RaindropClient;

/// State shared by every operation of a single polling pass. Set once at
/// startup; the timestamp doubles as the per-feed update guard in the
/// ledger.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub started_at: DateTime<Utc>,
}

pub struct App {
    config: Config,
    ledger: Ledger,
    store: LedgerStore,
    fetcher: FeedFetcher,
    raindrop: RaindropClient,
    run: RunContext,
}

impl App {
    pub fn new(config: Config, access_token: String) -> Result<Self> {
        let store = LedgerStore::new(&config.database_path);
        let ledger = store.load()?;
        let fetcher = FeedFetcher::new(config.request_timeout());
        let raindrop = RaindropClient::new(access_token);

        Ok(Self {
            config,
            ledger,
            store,
            fetcher,
            raindrop,
            run: RunContext {
                started_at: Utc::now(),
            },
        })
    }

    /// Processes every configured feed, one at a time, in configuration
    /// order. Feed failures are logged and isolated; the pass always
    /// reaches the end.
    pub async fn run(&mut self) {
        let feeds = self.config.feeds.clone();
        for feed in &feeds {
            self.process_feed(feed).await;
        }
    }

    /// Persists whatever ledger state the pass accumulated.
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.ledger)
    }

    async fn process_feed(&mut self, feed: &FeedConfig) {
        tracing::info!("Checking {}", feed.url);
        if let Some(filter) = &feed.filter {
            tracing::debug!("Filter {:?} configured for {} but not applied", filter, feed.url);
        }

        let mut entries = match self.fetcher.fetch(feed).await {
            Ok(entries) => entries,
            Err(AppError::Http(e)) if e.is_timeout() => {
                tracing::warn!("Timeout when reading feed: {}", feed.url);
                return;
            }
            Err(AppError::Http(e)) if e.is_connect() => {
                tracing::warn!("Cannot access feed: {}", feed.url);
                return;
            }
            Err(e) => {
                tracing::error!("Unexpected error on {}: {}", feed.url, e);
                return;
            }
        };
        sort_entries(&mut entries, feed.sort_key, &feed.url);

        let first_run = self.ledger.get(&feed.url).is_empty();
        if first_run {
            self.ledger.add(&feed.url);
        }

        // Snapshot taken before the scan: membership is tested against the
        // state of the previous pass, not against links recorded during
        // this one.
        let history = self.ledger.get(&feed.url).to_vec();

        for entry in &entries {
            // Everything below the first known link has been handled in an
            // earlier pass.
            if is_seen(&history, &entry.link) {
                break;
            }

            tracing::info!(
                "New article: {} ({}), published {}",
                entry.title,
                entry.link,
                entry
                    .published
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string()),
            );

            let title = feed.use_metadata.then_some(entry.title.as_str());
            match self.raindrop.add_article(&entry.link, title, &feed.tags).await {
                Ok(true) => {
                    tracing::info!("Article added");
                    self.ledger.update(&feed.url, &entry.link, self.run.started_at);
                }
                Ok(false) => tracing::warn!("Article not added: {}", entry.link),
                Err(e) => tracing::warn!("Article not added: {} ({})", entry.link, e),
            }

            // A feed seen for the first time contributes only its newest
            // entry; the rest of the backlog is never submitted.
            if first_run {
                break;
            }
        }
    }
}

/// Membership test against a feed's recent-link history. Any slot counts,
/// not just the newest one.
fn is_seen(history: &[Option<String>], link: &str) -> bool {
    history.iter().flatten().any(|seen| seen == link)
}
