use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("root path not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
