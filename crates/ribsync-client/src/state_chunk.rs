//! State chunks: per-block content snapshots at a known version.
//!
//! The cache holds what the server last acknowledged for each block. Comparing
//! a fresh snapshot of the live document against it tells a round which blocks
//! the user changed. Transforms rewrite the cache as they apply.
//!
//! A chunk may also carry tracked-change markup and a [`PendingReview`]: a
//! conflicted update or a server-side delete the user has not yet accepted or
//! rejected. Such chunks outlive the round that created them, and the block is
//! held back from transmission until the review is resolved.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use ribsync_doc::{DocError, DocumentModel};
use ribsync_types::BlockId;
use strum::Display;

/// Live document content keyed by id, in document order.
pub type Snapshot = IndexMap<BlockId, StateChunk>;

/// How a block's current content relates to a known version of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Divergence {
    /// Same content.
    Unchanged,
    /// Content differs on top of the same version: edited here.
    LocalOnly,
    /// The known side is newer and the local side never moved past it.
    RemoteOnly,
    /// Both moved: the local side is ahead of the baseline the other was computed from.
    Conflict,
}

/// Compare a local chunk with a known one.
///
/// Content is compared by hash first; versions decide the direction.
pub fn divergence(local: &StateChunk, known: &StateChunk) -> Divergence {
    if local.same_content(known) {
        return Divergence::Unchanged;
    }
    match local.version.cmp(&known.version) {
        std::cmp::Ordering::Equal => Divergence::LocalOnly,
        std::cmp::Ordering::Less => Divergence::RemoteOnly,
        std::cmp::Ordering::Greater => Divergence::Conflict,
    }
}

/// A change awaiting the user's accept or reject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingReview {
    /// Incoming update collided with local edits. Payloads of both sides.
    Conflict { before: String, after: String },
    /// Block deleted by the server. `after` is the predecessor it sat behind.
    Deletion {
        original: String,
        after: Option<BlockId>,
    },
}

/// Snapshot of one block's serialized content at a version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateChunk {
    pub id: BlockId,
    pub version: u64,
    payload: String,
    hash: u64,
    /// Tracked-change rendering of the block, when under review.
    pub marked_up: Option<String>,
    pub review: Option<PendingReview>,
}

fn content_hash(payload: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    payload.hash(&mut hasher);
    hasher.finish()
}

impl StateChunk {
    pub fn new(id: BlockId, payload: impl Into<String>, version: u64) -> Self {
        let payload = payload.into();
        Self {
            hash: content_hash(&payload),
            id,
            version,
            payload,
            marked_up: None,
            review: None,
        }
    }

    /// Attach markup and a review.
    pub fn with_review(mut self, marked_up: String, review: PendingReview) -> Self {
        self.marked_up = Some(marked_up);
        self.review = Some(review);
        self
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
        self.hash = content_hash(&self.payload);
    }

    pub fn same_content(&self, other: &StateChunk) -> bool {
        self.hash == other.hash && self.payload == other.payload
    }

    pub fn is_pending_review(&self) -> bool {
        self.review.is_some()
    }

    /// Drop markup and review, keeping payload and version.
    pub fn clear_review(&mut self) {
        self.marked_up = None;
        self.review = None;
    }
}

/// Acknowledged state per block.
#[derive(Clone, Debug, Default)]
pub struct StateChunkCache {
    chunks: HashMap<BlockId, StateChunk>,
}

impl StateChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every top-level block of the live document.
    ///
    /// Versions are the acknowledged ones (0 for blocks the server has never
    /// seen). Call under the document read lock.
    pub fn snapshot<D: DocumentModel>(&self, doc: &D) -> Result<Snapshot, DocError> {
        let ids = doc.block_ids();
        let mut snapshot = Snapshot::with_capacity(ids.len());
        for id in ids {
            if id.is_section_properties() {
                continue;
            }
            let payload = doc.serialize_block(&id)?;
            let version = self.version(&id).unwrap_or(0);
            snapshot.insert(id.clone(), StateChunk::new(id, payload, version));
        }
        Ok(snapshot)
    }

    /// Record server-acknowledged content, replacing any chunk (and review) for `id`.
    pub fn acknowledge(&mut self, id: BlockId, payload: impl Into<String>, version: u64) {
        self.chunks.insert(id.clone(), StateChunk::new(id, payload, version));
    }

    pub fn insert(&mut self, chunk: StateChunk) -> Option<StateChunk> {
        self.chunks.insert(chunk.id.clone(), chunk)
    }

    pub fn get(&self, id: &BlockId) -> Option<&StateChunk> {
        self.chunks.get(id)
    }

    pub fn get_mut(&mut self, id: &BlockId) -> Option<&mut StateChunk> {
        self.chunks.get_mut(id)
    }

    pub fn remove(&mut self, id: &BlockId) -> Option<StateChunk> {
        self.chunks.remove(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn version(&self, id: &BlockId) -> Option<u64> {
        self.chunks.get(id).map(|c| c.version)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateChunk> {
        self.chunks.values()
    }

    /// Chunks awaiting accept/reject.
    pub fn pending_reviews(&self) -> impl Iterator<Item = &StateChunk> {
        self.chunks.values().filter(|c| c.is_pending_review())
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ribsync_doc::BlockStore;
    use ribsync_types::BlockSnapshot;

    fn chunk(id: &str, payload: &str, version: u64) -> StateChunk {
        StateChunk::new(BlockId::from(id), payload, version)
    }

    #[test]
    fn test_divergence_table() {
        let known = chunk("a", "one", 2);
        assert_eq!(divergence(&chunk("a", "one", 2), &known), Divergence::Unchanged);
        assert_eq!(divergence(&chunk("a", "one", 5), &known), Divergence::Unchanged);
        assert_eq!(divergence(&chunk("a", "two", 2), &known), Divergence::LocalOnly);
        assert_eq!(divergence(&chunk("a", "two", 1), &known), Divergence::RemoteOnly);
        assert_eq!(divergence(&chunk("a", "two", 3), &known), Divergence::Conflict);
    }

    #[test]
    fn test_local_v2_against_v1_baseline_conflicts() {
        let local = chunk("a", r#"{"id":"a","text":"mine"}"#, 2);
        let incoming = chunk("a", r#"{"id":"a","text":"theirs"}"#, 1);
        assert_eq!(divergence(&local, &incoming), Divergence::Conflict);
    }

    #[test]
    fn test_snapshot_copies_blocks_in_order() {
        let doc = BlockStore::from_blocks(vec![
            BlockSnapshot::text(BlockId::from("x"), "first"),
            BlockSnapshot::text(BlockId::from("y"), "second"),
        ])
        .unwrap();
        let mut cache = StateChunkCache::new();
        cache.acknowledge(BlockId::from("y"), "stale", 4);

        let snap = cache.snapshot(&doc).unwrap();
        let ids: Vec<&str> = snap.keys().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(snap[&BlockId::from("x")].version, 0);
        assert_eq!(snap[&BlockId::from("y")].version, 4);
        let y = BlockSnapshot::from_payload(snap[&BlockId::from("y")].payload()).unwrap();
        assert_eq!(y.text, "second");
    }

    #[test]
    fn test_set_payload_rehashes() {
        let mut a = chunk("a", "one", 1);
        let b = chunk("a", "two", 1);
        assert!(!a.same_content(&b));
        a.set_payload("two");
        assert!(a.same_content(&b));
    }

    #[test]
    fn test_acknowledge_clears_review() {
        let mut cache = StateChunkCache::new();
        cache.insert(chunk("a", "x", 1).with_review(
            "<del>x</del>".into(),
            PendingReview::Deletion { original: "x".into(), after: None },
        ));
        assert_eq!(cache.pending_reviews().count(), 1);
        cache.acknowledge(BlockId::from("a"), "y", 2);
        assert_eq!(cache.pending_reviews().count(), 0);
        assert_eq!(cache.version(&BlockId::from("a")), Some(2));
    }
}
