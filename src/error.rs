use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage unavailable: {0}")]
    Storage(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI model error: {0}")]
    Ai(String),

    #[error("Page text too short to process ({0} chars)")]
    ContentTooShort(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl AppError {
    /// True when the persistence layer failed and the caller may retry later.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
