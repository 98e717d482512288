use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Raindrop API error: {0}")]
    RaindropApi(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
