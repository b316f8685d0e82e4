use thiserror::Error;

use crate::blend::BlendError;
use crate::compositor::CompositorError;
use crate::generation::GenerationError;
use crate::pool::PoolError;
use crate::raster::CodecError;
use crate::storage::StorageError;
use crate::tools::{ArgsError, ToolError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Blend(#[from] BlendError),

    #[error(transparent)]
    Compositor(#[from] CompositorError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Args(#[from] ArgsError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<CoreError> for String {
    fn from(e: CoreError) -> Self {
        e.to_string()
    }
}
