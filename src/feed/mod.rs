mod fetcher;

pub use fetcher::{sort_entries, FeedFetcher};
