//! Error types for document operations.

use thiserror::Error;

use crate::BlockId;

/// Errors that can occur while reading or mutating a document.
#[derive(Error, Debug)]
pub enum DocError {
    /// Block not found in document.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// Invalid anchor block for insertion.
    #[error("anchor block not found: {0}")]
    InvalidAnchor(BlockId),

    /// Duplicate block ID.
    #[error("block already exists: {0}")]
    DuplicateBlock(BlockId),

    /// Edit position out of bounds.
    #[error("edit position {pos} out of bounds for block with length {len}")]
    PositionOutOfBounds { pos: usize, len: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ribsync_types::PayloadError> for DocError {
    fn from(e: ribsync_types::PayloadError) -> Self {
        DocError::Serialization(e.to_string())
    }
}
