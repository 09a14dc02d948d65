use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipeDbError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Parse: {0}")]
    Parse(String),

    #[error("stage {} failed to compile: {message}", path.display())]
    StageCompileFailed { path: PathBuf, message: String },

    #[error("stage limit exceeded (max {limit})")]
    StageLimitExceeded { limit: usize },

    #[error("unknown shader stage for {0}")]
    UnknownShaderStage(String),

    #[error("arena out of space: requested {requested} bytes, {remaining} remaining")]
    OutOfSpace { requested: usize, remaining: usize },

    /// Someone else moved the arena cursor while a record was open.
    #[error("non-contiguous stage allocation: expected offset {expected}, got {actual}")]
    NonContiguous { expected: usize, actual: usize },

    #[error("pipeline not found: {0}")]
    NameNotFound(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),
}

impl PipeDbError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        PipeDbError::Parse(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        PipeDbError::CorruptImage(msg.into())
    }

    /// Arena-level failures. These abort a build instead of one material.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipeDbError::OutOfSpace { .. } | PipeDbError::NonContiguous { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipeDbError>;
