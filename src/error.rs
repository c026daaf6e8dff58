use thiserror::Error;

/// Errors that abort a whole ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http request failed for {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode listing from {url}: {source}")]
    Decode {
        url: String,
        source: reqwest::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by an [`EventStore`](crate::db::EventStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("store api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("record \"{title}\" has no url to key on")]
    MissingUrl { title: String },

    #[error("store task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
