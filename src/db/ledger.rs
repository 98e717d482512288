use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Number of recently saved links remembered per feed. Checking membership
/// against the last few links instead of only the latest one tolerates feeds
/// that reorder or republish entries between polls.
pub const HISTORY_SLOTS: usize = 10;

/// Version stamped into every row on write. Rows written by a different
/// major version cannot be trusted and invalidate the whole database.
pub const SCHEMA_VERSION: &str = "2.0.0";

/// Stored schema version, as read back from the `rss_database_version`
/// column. Major-version-only: minor and patch differences are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Legacy layout without a version column (two fixed link columns).
    V1,
    /// Current layout: ten link slots plus the version column.
    V2,
    /// Written by some future or unknown version.
    Other,
}

impl SchemaVersion {
    /// `raw` is the stored version string, or `None` when the column is
    /// absent (which only the legacy layout is allowed to be).
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return SchemaVersion::V1;
        };
        match raw.split('.').next().and_then(|major| major.parse::<u32>().ok()) {
            Some(1) => SchemaVersion::V1,
            Some(2) => SchemaVersion::V2,
            _ => SchemaVersion::Other,
        }
    }

    /// Whether a database stamped with this version can be kept. Anything
    /// other than the current major is discarded wholesale, never migrated
    /// row by row.
    pub fn is_compatible(self) -> bool {
        matches!(self, SchemaVersion::V2)
    }
}

/// One feed's dedup state: the most recently saved links, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHistory {
    pub recent_links: [Option<String>; HISTORY_SLOTS],
    pub updated_time: Option<DateTime<Utc>>,
    pub schema_version: String,
}

impl FeedHistory {
    fn new() -> Self {
        Self {
            recent_links: Default::default(),
            updated_time: None,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// Per-feed dedup table, keyed by feed URL. Kept in memory for the duration
/// of a run; loaded and persisted by [`LedgerStore`](super::LedgerStore).
///
/// A `BTreeMap` keeps rows ordered by feed URL, which makes the persisted
/// output deterministic.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    feeds: BTreeMap<String, FeedHistory>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feed seen for the first time, with all history slots
    /// empty. No-op if the feed already has a row.
    pub fn add(&mut self, feed_url: &str) {
        self.feeds
            .entry(feed_url.to_string())
            .or_insert_with(FeedHistory::new);
    }

    /// The feed's history slots, newest first. Returns an empty slice for an
    /// unknown feed; a known feed always yields all `HISTORY_SLOTS` slots,
    /// empty or not. Callers rely on that distinction to detect first runs.
    pub fn get(&self, feed_url: &str) -> &[Option<String>] {
        self.feeds
            .get(feed_url)
            .map(|row| row.recent_links.as_slice())
            .unwrap_or(&[])
    }

    /// Records `link` as the feed's newest saved article, evicting the
    /// oldest slot. Only the first update per feed per run takes effect:
    /// once `updated_time` matches the run's start timestamp, later calls in
    /// the same run are dropped entirely, stamp included. No-op for unknown
    /// feeds.
    pub fn update(&mut self, feed_url: &str, link: &str, run_started: DateTime<Utc>) {
        let Some(row) = self.feeds.get_mut(feed_url) else {
            return;
        };
        if row.updated_time == Some(run_started) {
            return;
        }
        row.recent_links.rotate_right(1);
        row.recent_links[0] = Some(link.to_string());
        row.updated_time = Some(run_started);
        row.schema_version = SCHEMA_VERSION.to_string();
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Rows in feed-URL order.
    pub(crate) fn rows(&self) -> impl Iterator<Item = (&String, &FeedHistory)> {
        self.feeds.iter()
    }

    pub(crate) fn insert_row(&mut self, feed_url: String, row: FeedHistory) {
        self.feeds.insert(feed_url, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run_at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn unknown_feed_yields_empty_history() {
        let ledger = Ledger::new();
        assert!(ledger.get("https://example.com/rss").is_empty());
    }

    #[test]
    fn added_feed_yields_all_empty_slots() {
        let mut ledger = Ledger::new();
        ledger.add("https://example.com/rss");

        let history = ledger.get("https://example.com/rss");
        assert_eq!(history.len(), HISTORY_SLOTS);
        assert!(history.iter().all(Option::is_none));
    }

    #[test]
    fn add_is_idempotent() {
        let mut ledger = Ledger::new();
        ledger.add("https://example.com/rss");
        ledger.update("https://example.com/rss", "https://example.com/a", run_at(0));
        ledger.add("https://example.com/rss");

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.get("https://example.com/rss")[0].as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn update_on_unknown_feed_is_a_noop() {
        let mut ledger = Ledger::new();
        ledger.update("https://example.com/rss", "https://example.com/a", run_at(0));
        assert!(ledger.is_empty());
    }

    #[test]
    fn updates_across_runs_shift_newest_first() {
        let mut ledger = Ledger::new();
        ledger.add("f");
        ledger.update("f", "a", run_at(0));
        ledger.update("f", "b", run_at(1));
        ledger.update("f", "c", run_at(2));

        let history = ledger.get("f");
        assert_eq!(history[0].as_deref(), Some("c"));
        assert_eq!(history[1].as_deref(), Some("b"));
        assert_eq!(history[2].as_deref(), Some("a"));
        assert!(history[3..].iter().all(Option::is_none));
    }

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let mut ledger = Ledger::new();
        ledger.add("f");
        for i in 0..HISTORY_SLOTS + 3 {
            ledger.update("f", &format!("link-{i}"), run_at(i as u32));
        }

        let history = ledger.get("f");
        assert_eq!(history.len(), HISTORY_SLOTS);
        for (slot, stored) in history.iter().enumerate() {
            let expected = format!("link-{}", HISTORY_SLOTS + 2 - slot);
            assert_eq!(stored.as_deref(), Some(expected.as_str()));
        }
    }

    #[test]
    fn second_update_in_same_run_is_dropped() {
        let mut ledger = Ledger::new();
        ledger.add("f");
        let run = run_at(0);
        ledger.update("f", "first", run);
        ledger.update("f", "second", run);

        let history = ledger.get("f");
        assert_eq!(history[0].as_deref(), Some("first"));
        assert!(history[1].is_none());
    }

    #[test]
    fn next_run_shifts_again() {
        let mut ledger = Ledger::new();
        ledger.add("f");
        ledger.update("f", "first", run_at(0));
        ledger.update("f", "ignored", run_at(0));
        ledger.update("f", "second", run_at(1));

        let history = ledger.get("f");
        assert_eq!(history[0].as_deref(), Some("second"));
        assert_eq!(history[1].as_deref(), Some("first"));
        assert!(history[2].is_none());
    }

    #[test]
    fn update_stamps_current_schema_version() {
        let mut ledger = Ledger::new();
        ledger.insert_row(
            "f".to_string(),
            FeedHistory {
                recent_links: Default::default(),
                updated_time: None,
                schema_version: "2.0.0-old".to_string(),
            },
        );
        ledger.update("f", "a", run_at(0));

        let (_, row) = ledger.rows().next().unwrap();
        assert_eq!(row.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_decision_table() {
        assert_eq!(SchemaVersion::parse(None), SchemaVersion::V1);
        assert_eq!(SchemaVersion::parse(Some("1.0.0")), SchemaVersion::V1);
        assert_eq!(SchemaVersion::parse(Some("1.4.2")), SchemaVersion::V1);
        assert_eq!(SchemaVersion::parse(Some("2.0.0")), SchemaVersion::V2);
        assert_eq!(SchemaVersion::parse(Some("2.3.1")), SchemaVersion::V2);
        assert_eq!(SchemaVersion::parse(Some("3.0.0")), SchemaVersion::Other);
        assert_eq!(SchemaVersion::parse(Some("garbage")), SchemaVersion::Other);
        assert_eq!(SchemaVersion::parse(Some("")), SchemaVersion::Other);

        assert!(!SchemaVersion::V1.is_compatible());
        assert!(SchemaVersion::V2.is_compatible());
        assert!(!SchemaVersion::Other.is_compatible());
    }
}
