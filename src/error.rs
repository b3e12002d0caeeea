use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error on cache entry '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache entry '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid cache key: '{key}'")]
    InvalidKey { key: String },
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Media item not found: {id}")]
    NotFound { id: String },

    #[error("Remote library unavailable: {message}")]
    Unavailable { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed library data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Media item id '{id}' projected more than once")]
    DuplicateId { id: String },

    #[error("Scored media item '{id}' is missing from the library")]
    MissingItem { id: String },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Operation cancelled")]
    Cancelled,
}
