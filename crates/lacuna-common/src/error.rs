use thiserror::Error;

#[derive(Debug, Error)]
pub enum LacunaError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network capability denied: {0}")]
    SecurityError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LacunaError>;
