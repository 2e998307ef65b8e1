use thiserror::Error;

use crate::models::ShowKey;

#[derive(Debug, Error)]
pub enum MarqueeError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0} is not tracked")]
    NotTracked(ShowKey),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
