//! Block store: arena of blocks keyed by id, ordered by fractional keys.
//!
//! This is the in-memory document the sync engine mutates through
//! [`DocumentModel`]. Editors mutate it through the `*_local` methods, which
//! also record the touched ids so a sync round knows what to transmit.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use ribsync_types::BlockSnapshot;

use crate::order::{order_midpoint, FIRST_KEY};
use crate::{BlockId, DocError, DocumentModel, Result};

/// A block plus its position key.
#[derive(Clone, Debug)]
struct StoredBlock {
    snapshot: BlockSnapshot,
    order_key: String,
}

/// Collection of blocks in document order.
///
/// Blocks are separated by a single newline in [`full_text`](Self::full_text),
/// and spans count that separator, so offsets line up with the rendered text.
#[derive(Debug, Default)]
pub struct BlockStore {
    /// Blocks indexed by ID.
    blocks: BTreeMap<BlockId, StoredBlock>,

    /// Store version (bumped on any mutation).
    version: u64,

    /// Document-level style applied by id-less style changes.
    stylesheet: Option<String>,

    /// Ids edited locally since the last sync round picked them up.
    local_changes: BTreeSet<BlockId>,
}

impl BlockStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from blocks in document order.
    pub fn from_blocks(blocks: impl IntoIterator<Item = BlockSnapshot>) -> Result<Self> {
        let mut store = Self::new();
        let mut last: Option<BlockId> = None;
        for snap in blocks {
            let id = snap.id.clone();
            store.insert_snapshot(last.as_ref(), snap)?;
            last = Some(id);
        }
        Ok(store)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_block(&self, id: &BlockId) -> Option<&BlockSnapshot> {
        self.blocks.get(id).map(|b| &b.snapshot)
    }

    /// Text of one block.
    pub fn text(&self, id: &BlockId) -> Option<&str> {
        self.get_block(id).map(|b| b.text.as_str())
    }

    /// Document-level style, if one has been applied.
    pub fn stylesheet(&self) -> Option<&str> {
        self.stylesheet.as_deref()
    }

    /// Get block IDs in document order (sorted by order_key, BlockId tiebreak).
    pub fn block_ids_ordered(&self) -> Vec<BlockId> {
        let mut ordered: Vec<_> = self
            .blocks
            .iter()
            .map(|(id, b)| (b.order_key.as_str(), id))
            .collect();
        ordered.sort();
        ordered.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Get blocks in document order.
    pub fn blocks_ordered(&self) -> Vec<&BlockSnapshot> {
        self.block_ids_ordered()
            .iter()
            .filter_map(|id| self.get_block(id))
            .collect()
    }

    /// Full text content (blocks joined by newlines).
    pub fn full_text(&self) -> String {
        self.blocks_ordered()
            .into_iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    // =========================================================================
    // Local editing
    // =========================================================================

    /// Insert a new locally authored block and return its fresh id.
    pub fn insert_local(&mut self, after: Option<&BlockId>, text: impl Into<String>) -> Result<BlockId> {
        let id = BlockId::generate();
        self.insert_snapshot(after, BlockSnapshot::text(id.clone(), text))?;
        self.local_changes.insert(id.clone());
        Ok(id)
    }

    /// Replace a block's text.
    pub fn set_text_local(&mut self, id: &BlockId, text: impl Into<String>) -> Result<()> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| DocError::BlockNotFound(id.clone()))?;
        block.snapshot.text = text.into();
        self.version += 1;
        self.local_changes.insert(id.clone());
        Ok(())
    }

    /// Edit text within a block (char offsets).
    pub fn edit_text_local(&mut self, id: &BlockId, pos: usize, insert: &str, delete: usize) -> Result<()> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| DocError::BlockNotFound(id.clone()))?;

        let len = block.snapshot.char_len();
        if pos > len {
            return Err(DocError::PositionOutOfBounds { pos, len });
        }
        if pos + delete > len {
            return Err(DocError::PositionOutOfBounds { pos: pos + delete, len });
        }

        let text = &block.snapshot.text;
        let mut edited: String = text.chars().take(pos).collect();
        edited.push_str(insert);
        edited.extend(text.chars().skip(pos + delete));
        block.snapshot.text = edited;

        self.version += 1;
        self.local_changes.insert(id.clone());
        Ok(())
    }

    /// Remove a block as a local edit.
    pub fn remove_local(&mut self, id: &BlockId) -> Result<BlockSnapshot> {
        let removed = self.detach(id)?;
        self.local_changes.insert(id.clone());
        Ok(removed)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Compute an order_key for a new block inserted after `after`.
    // TODO: O(N log N) per insertion due to block_ids_ordered(); keep a sorted
    // key index if documents grow past a few thousand blocks.
    fn calc_order_key(&self, after: Option<&BlockId>) -> Result<String> {
        let ordered = self.block_ids_ordered();
        let key_at = |idx: usize| self.blocks[&ordered[idx]].order_key.as_str();

        let key = match after {
            None if ordered.is_empty() => FIRST_KEY.to_string(),
            None => order_midpoint("", Some(key_at(0))),
            Some(after_id) => {
                let idx = ordered
                    .iter()
                    .position(|id| id == after_id)
                    .ok_or_else(|| DocError::InvalidAnchor(after_id.clone()))?;
                let next = (idx + 1 < ordered.len()).then(|| key_at(idx + 1));
                order_midpoint(key_at(idx), next)
            }
        };
        Ok(key)
    }

    fn insert_snapshot(&mut self, after: Option<&BlockId>, snapshot: BlockSnapshot) -> Result<()> {
        if self.blocks.contains_key(&snapshot.id) {
            return Err(DocError::DuplicateBlock(snapshot.id));
        }
        let order_key = self.calc_order_key(after)?;
        self.blocks.insert(snapshot.id.clone(), StoredBlock { snapshot, order_key });
        self.version += 1;
        Ok(())
    }

    fn detach(&mut self, id: &BlockId) -> Result<BlockSnapshot> {
        let removed = self
            .blocks
            .remove(id)
            .ok_or_else(|| DocError::BlockNotFound(id.clone()))?;
        self.version += 1;
        Ok(removed.snapshot)
    }

    fn whole_span(&self) -> Option<Range<usize>> {
        let len = self.full_text().chars().count();
        (!self.blocks.is_empty()).then_some(0..len)
    }
}

impl DocumentModel for BlockStore {
    type Block = BlockSnapshot;

    fn block_ids(&self) -> Vec<BlockId> {
        self.block_ids_ordered()
    }

    fn contains_block(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    fn serialize_block(&self, id: &BlockId) -> Result<String> {
        let block = self
            .get_block(id)
            .ok_or_else(|| DocError::BlockNotFound(id.clone()))?;
        Ok(block.to_payload()?)
    }

    fn deserialize_block(&self, payload: &str) -> Result<BlockSnapshot> {
        Ok(BlockSnapshot::from_payload(payload)?)
    }

    fn replace_block(&mut self, id: &BlockId, mut block: BlockSnapshot) -> Result<()> {
        let stored = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| DocError::BlockNotFound(id.clone()))?;
        if block.id != *id {
            tracing::debug!("replace_block: payload id {} rebound to {}", block.id, id);
            block.id = id.clone();
        }
        stored.snapshot = block;
        self.version += 1;
        Ok(())
    }

    fn insert_block(&mut self, after: Option<&BlockId>, block: BlockSnapshot) -> Result<()> {
        self.insert_snapshot(after, block)
    }

    fn delete_block(&mut self, id: &BlockId) -> Result<BlockSnapshot> {
        self.detach(id)
    }

    fn block_span(&self, id: &BlockId) -> Option<Range<usize>> {
        let mut offset = 0;
        for block in self.blocks_ordered() {
            let len = block.char_len();
            if block.id == *id {
                return Some(offset..offset + len);
            }
            offset += len + 1;
        }
        None
    }

    fn apply_style(&mut self, target: Option<&BlockId>, style: &str) -> Result<Option<Range<usize>>> {
        match target {
            Some(id) => {
                let Some(stored) = self.blocks.get_mut(id) else {
                    return Ok(None);
                };
                stored.snapshot.style = Some(style.to_string());
                self.version += 1;
                Ok(self.block_span(id))
            }
            None => {
                self.stylesheet = Some(style.to_string());
                self.version += 1;
                Ok(self.whole_span())
            }
        }
    }

    fn locally_changed_blocks(&self) -> Vec<BlockId> {
        self.local_changes.iter().cloned().collect()
    }

    fn clear_local_changes(&mut self) {
        self.local_changes.clear();
    }
}

// =========================================================================
// Tests
// =========================================================================
