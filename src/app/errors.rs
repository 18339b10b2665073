use crate::{
    ai::ChatError,
    cache::CacheError,
    matcher::MatchError,
    semantic::{IndexError, VectorStorageError},
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("vector storage error: {0}")]
    VectorStorage(#[from] VectorStorageError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
