use chrono::{DateTime, Utc};

/// A single article extracted from a fetched feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}
