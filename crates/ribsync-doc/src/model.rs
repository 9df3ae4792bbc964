//! The document-model seam the sync engine drives.

use std::ops::Range;

use crate::{BlockId, Result};

/// Operations the sync engine needs from a live document.
///
/// Offsets returned by [`block_span`](Self::block_span) are character offsets
/// into the rendered document; the engine only aggregates them into a dirty
/// region for the UI, it never interprets them.
pub trait DocumentModel {
    /// Handle to a detached block (the deserialized form of a payload).
    type Block;

    /// Top-level block ids in document order.
    fn block_ids(&self) -> Vec<BlockId>;

    fn contains_block(&self, id: &BlockId) -> bool;

    /// Serialize one block to its opaque textual payload.
    fn serialize_block(&self, id: &BlockId) -> Result<String>;

    /// Parse a payload into a detached block handle.
    fn deserialize_block(&self, payload: &str) -> Result<Self::Block>;

    /// Replace the block at `id` in place. The block keeps its position and id.
    fn replace_block(&mut self, id: &BlockId, block: Self::Block) -> Result<()>;

    /// Insert a block after `after` (`None` = start of document).
    /// The new block's id comes from the handle.
    fn insert_block(&mut self, after: Option<&BlockId>, block: Self::Block) -> Result<()>;

    /// Detach a block from the document, returning it.
    fn delete_block(&mut self, id: &BlockId) -> Result<Self::Block>;

    /// Character range the block currently occupies.
    fn block_span(&self, id: &BlockId) -> Option<Range<usize>>;

    /// Apply a formatting-only change.
    ///
    /// `target = None` is a document-level style change. Returns the touched
    /// span, or `None` when nothing matched (a no-op, not an error).
    fn apply_style(&mut self, target: Option<&BlockId>, style: &str) -> Result<Option<Range<usize>>>;

    /// Blocks the editor knows it touched since the last [`clear_local_changes`](Self::clear_local_changes).
    ///
    /// A hint only: sync rounds find local edits by comparing content.
    fn locally_changed_blocks(&self) -> Vec<BlockId> {
        Vec::new()
    }

    fn clear_local_changes(&mut self) {}
}
