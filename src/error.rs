#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation already in progress: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No permission table loaded: {0}")]
    Unloaded(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
