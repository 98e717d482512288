mod entry;

pub use entry::FeedEntry;
