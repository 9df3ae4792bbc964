//! Session coordinator: one synchronization round end to end.
//!
//! ```text
//!   read lock          transport                 write lock
//!   ┌──────────────┐   ┌───────────────────┐     ┌─────────────────────────┐
//!   │ snapshot +   │──▶│ exchange(payload) │──▶  │ sort by seq, drop stale │
//!   │ extract diff │   │ parse manifest    │     │ apply each transform    │
//!   └──────────────┘   └───────────────────┘     │ accumulate dirty region │
//!                                                └─────────────────────────┘
//! ```
//!
//! Anything failing before the write lock is taken aborts the round with the
//! document untouched. Once applying starts, per-transform errors are logged
//! and counted, and the batch carries on. Cancellation is honoured up to the
//! write lock and then only between transforms.
//!
//! The remembered server structure follows every applied transform, so a
//! round that stops part-way never mistakes server blocks for local ones.
//!
//! Editor change hints ([`DocumentModel::locally_changed_blocks`]) are
//! advisory and only logged. Extraction always compares the whole document
//! with the acknowledged state chunks, so clearing the hints after a round
//! cannot drop an edit made while the exchange was in flight.

use std::collections::HashSet;
use std::ops::Range;

use ribsync_doc::{DocumentModel, SharedDocument};
use ribsync_types::{
    BlockId, OutboundBlock, OutboundChange, OutboundPayload, Rib, SequenceNumber, ServerResponse,
};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::differ::{diff, DiffOp};
use crate::dirty::DirtyRegion;
use crate::error::{ApplyError, ManifestParseError, ResolveError, SequenceRegression, SyncError};
use crate::skeleton::Skeleton;
use crate::state_chunk::{divergence, Divergence, PendingReview, StateChunkCache};
use crate::transform::{ApplyContext, Transform};
use crate::transport::Transport;

/// Everything a round touches outside the session's own bookkeeping.
pub struct SessionContext<D, T> {
    pub document: SharedDocument<D>,
    pub transport: T,
    pub dirty: DirtyRegion,
}

/// User decision on a pending review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Resolution {
    /// Take the server's side.
    Accept,
    /// Keep the local side.
    Reject,
}

/// Counters from applying one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    /// Apply errors, isolated per transform.
    pub failed: usize,
    /// Re-deliveries dropped by the sequence guard.
    pub discarded: usize,
    /// Transforms on a block whose pipeline broke earlier in the batch.
    pub skipped: usize,
    /// Transforms left unapplied because the round was cancelled mid-batch.
    pub aborted: usize,
    pub highest_applied: SequenceNumber,
}

/// Outcome of one round, as posted to the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub success: bool,
    /// Span to re-render, if anything changed.
    pub dirty: Option<Range<usize>>,
    /// Blocks transmitted.
    pub sent: usize,
    pub applied: usize,
    pub failed: usize,
    pub discarded: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub highest_applied: SequenceNumber,
    /// Summary for the user when the round did not succeed.
    pub error: Option<String>,
}

impl RoundReport {
    /// Report for a round that aborted before touching the document.
    pub fn aborted(err: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Sync state for one document.
pub struct Session<D, T> {
    ctx: SessionContext<D, T>,
    config: SyncConfig,
    chunks: StateChunkCache,
    /// Server structure as of the last completed round.
    remote: Skeleton,
    last_applied: SequenceNumber,
    server_highest: SequenceNumber,
}

impl<D, T> Session<D, T>
where
    D: DocumentModel,
    T: Transport,
{
    pub fn new(document: SharedDocument<D>, transport: T, config: SyncConfig) -> Self {
        Self {
            ctx: SessionContext {
                document,
                transport,
                dirty: DirtyRegion::new(),
            },
            config,
            chunks: StateChunkCache::new(),
            remote: Skeleton::default(),
            last_applied: 0,
            server_highest: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn document(&self) -> &SharedDocument<D> {
        &self.ctx.document
    }

    pub fn transport(&self) -> &T {
        &self.ctx.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn chunks(&self) -> &StateChunkCache {
        &self.chunks
    }

    pub fn remote_skeleton(&self) -> &Skeleton {
        &self.remote
    }

    pub fn last_applied(&self) -> SequenceNumber {
        self.last_applied
    }

    /// Highest sequence number the server reported in the last round.
    pub fn server_highest(&self) -> SequenceNumber {
        self.server_highest
    }

    /// Blocks with a conflict or deletion awaiting accept/reject.
    pub fn pending_reviews(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.chunks.pending_reviews().map(|c| c.id.clone()).collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Baseline
    // =========================================================================

    /// Treat the current document as the server state described by `response`.
    ///
    /// Used when the document was loaded from the same server snapshot the
    /// manifest describes. Every block present in both is acknowledged at the
    /// manifest's version.
    pub fn adopt_baseline(&mut self, response: &ServerResponse) -> Result<(), SyncError> {
        let remote = Skeleton::from_manifest(&response.manifest);
        let doc = self.ctx.document.read();
        let mut snapshot = self.chunks.snapshot(&*doc)?;

        self.chunks.clear();
        for rib in remote.iter() {
            if let Some(chunk) = snapshot.swap_remove(&rib.id) {
                self.chunks.acknowledge(rib.id.clone(), chunk.payload(), rib.version);
            }
        }
        if !snapshot.is_empty() {
            debug!("{} local blocks not on the server yet", snapshot.len());
        }
        info!(
            "baseline adopted: {} blocks at seq {}",
            self.chunks.len(),
            response.highest_seq
        );
        self.remote = remote;
        self.last_applied = response.highest_seq;
        self.server_highest = response.highest_seq;
        Ok(())
    }

    /// Fetch the current manifest and adopt it as the baseline.
    pub async fn open(&mut self) -> Result<(), SyncError> {
        let raw = self.ctx.transport.fetch(0).await?;
        let response = parse_response(&raw)?;
        self.adopt_baseline(&response)
    }

    // =========================================================================
    // Round steps
    // =========================================================================

    /// Diff the live document against the last acknowledged state.
    ///
    /// Structural changes come from diffing the remote skeleton with the local
    /// one; content changes from comparing each kept block with its state
    /// chunk. Blocks under review are held back. Call under the read lock.
    pub fn extract_local_changes(&self, doc: &D) -> Result<OutboundPayload, ribsync_doc::DocError> {
        let local = Skeleton::from_document(doc, &self.chunks);
        let script = diff(&self.remote, &local);
        let snapshot = self.chunks.snapshot(doc)?;
        let held = |id: &BlockId| self.chunks.get(id).is_some_and(|c| c.is_pending_review());

        let mut blocks = Vec::new();
        for op in script.ops() {
            let id = op.id();
            if held(id) {
                continue;
            }
            let base_version = self.chunks.version(id).unwrap_or(0);
            let change = match op {
                DiffOp::Match { .. } => {
                    let (Some(current), Some(acked)) = (snapshot.get(id), self.chunks.get(id)) else {
                        continue;
                    };
                    if divergence(current, acked) == Divergence::Unchanged {
                        continue;
                    }
                    OutboundChange::Content {
                        payload: current.payload().to_string(),
                    }
                }
                DiffOp::Insert { after, .. } | DiffOp::Move { after, .. } => {
                    let Some(current) = snapshot.get(id) else { continue };
                    OutboundChange::Inserted {
                        after: after.clone(),
                        payload: current.payload().to_string(),
                    }
                }
                DiffOp::Delete { .. } => OutboundChange::Deleted,
            };
            blocks.push(OutboundBlock {
                id: id.clone(),
                base_version,
                change,
            });
        }

        Ok(OutboundPayload {
            document_id: self.config.document_id.clone(),
            client_id: self.config.client_id.clone(),
            highest_fetched: self.last_applied,
            blocks,
        })
    }

    /// Turn a server response into executable transforms, unsorted.
    pub fn transforms_from_response(&self, response: &ServerResponse) -> Result<Vec<Transform>, ManifestParseError> {
        let anchors = diff(&self.remote, &Skeleton::ordering(&response.manifest));
        let mut transforms = Vec::new();
        for entry in &response.manifest {
            for desc in &entry.transforms {
                transforms.push(Transform::from_descriptor(
                    entry,
                    desc,
                    &self.config.client_id,
                    &anchors,
                )?);
            }
        }
        Ok(transforms)
    }

    /// Sort and apply a batch under the write lock.
    ///
    /// Transforms at or below the last applied sequence number are dropped.
    /// A delete that reaches apply without markup stops every later transform
    /// for the same block in this batch.
    pub fn apply_transforms(&mut self, mut transforms: Vec<Transform>, cancel: &CancellationToken) -> BatchOutcome {
        transforms.sort_by_key(Transform::seq);
        let total = transforms.len();
        let mut outcome = BatchOutcome {
            highest_applied: self.last_applied,
            ..BatchOutcome::default()
        };
        let mut broken: HashSet<BlockId> = HashSet::new();

        let mut doc = self.ctx.document.write();
        for (i, mut transform) in transforms.into_iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.aborted = total - i;
                warn!("round cancelled with {} transforms left", outcome.aborted);
                break;
            }
            let seq = transform.seq();
            if seq <= self.last_applied {
                let regression = SequenceRegression {
                    seq,
                    last_applied: self.last_applied,
                };
                debug!("discarding re-delivered transform: {}", regression);
                outcome.discarded += 1;
                continue;
            }

            if transform.target().is_some_and(|id| broken.contains(id)) {
                warn!("skipping {} transform {}: block pipeline broken earlier", transform.kind(), seq);
                outcome.skipped += 1;
            } else {
                if let Err(e) = transform.prepare_markup(&*doc, &self.config.markup) {
                    warn!("{}", e);
                }
                let mut ctx = ApplyContext {
                    doc: &mut *doc,
                    chunks: &mut self.chunks,
                    dirty: &mut self.ctx.dirty,
                    markup: &self.config.markup,
                };
                match transform.apply(&mut ctx) {
                    Ok(_) => {
                        outcome.applied += 1;
                        track_remote(&mut self.remote, &transform, &*doc);
                    }
                    Err(ApplyError::MissingMarkup(id)) => {
                        error!("internal invariant violated: delete of {} without markup (seq {})", id, seq);
                        broken.insert(id);
                        outcome.failed += 1;
                    }
                    Err(e) => {
                        warn!("{} transform {} not applied: {}", transform.kind(), seq, e);
                        outcome.failed += 1;
                    }
                }
            }
            self.last_applied = seq;
            outcome.highest_applied = seq;
        }
        outcome
    }

    /// Run one full round: extract, transmit, receive, apply, report.
    #[tracing::instrument(skip(self, cancel), name = "sync_round", fields(document = %self.config.document_id))]
    pub async fn run_round(&mut self, cancel: &CancellationToken) -> Result<RoundReport, SyncError> {
        let payload = {
            let doc = self.ctx.document.read();
            let hinted = doc.locally_changed_blocks().len();
            let payload = self.extract_local_changes(&*doc)?;
            debug!("extracted {} changed blocks ({} hinted by editor)", payload.blocks.len(), hinted);
            payload
        };
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let sent = payload.blocks.len();
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            reply = self.ctx.transport.exchange(payload) => reply?,
        };
        let response = parse_response(&raw)?;
        let transforms = self.transforms_from_response(&response)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let outcome = self.apply_transforms(transforms, cancel);
        self.server_highest = response.highest_seq;
        let completed = outcome.aborted == 0;
        if completed {
            self.adopt_remote(&response);
            self.ctx.document.write().clear_local_changes();
        }

        let report = RoundReport {
            success: completed,
            dirty: self.ctx.dirty.take(),
            sent,
            applied: outcome.applied,
            failed: outcome.failed,
            discarded: outcome.discarded,
            skipped: outcome.skipped,
            aborted: outcome.aborted,
            highest_applied: outcome.highest_applied,
            error: (!completed).then(|| format!("cancelled with {} transforms unapplied", outcome.aborted)),
        };
        info!(
            "round done: sent {}, applied {}, failed {}, discarded {}, at seq {}",
            report.sent, report.applied, report.failed, report.discarded, report.highest_applied
        );
        Ok(report)
    }

    /// Remember the server's structure, minus blocks this client never
    /// acknowledged (their inserts failed), so they are not sent back as deletes.
    fn adopt_remote(&mut self, response: &ServerResponse) {
        let mut remote = Skeleton::from_manifest(&response.manifest);
        let unknown: Vec<BlockId> = remote
            .ids()
            .filter(|id| !self.chunks.contains(id))
            .cloned()
            .collect();
        for id in &unknown {
            debug!("remote block {} not acknowledged locally", id);
            remote.remove(id);
        }
        self.remote = remote;
    }

    /// Whether the server holds transforms past the last applied one.
    ///
    /// Uses the skeleton cutoff peek, so no diff is computed.
    pub async fn has_remote_changes(&self) -> Result<bool, SyncError> {
        let raw = self.ctx.transport.fetch(self.last_applied).await?;
        let response = parse_response(&raw)?;
        match Skeleton::build(&response.manifest, Some(self.last_applied)) {
            Ok(_) => Ok(false),
            Err(newer) => {
                debug!("{}", newer);
                Ok(true)
            }
        }
    }

    // =========================================================================
    // Review
    // =========================================================================

    /// Accept or reject a pending conflict or deletion.
    ///
    /// Returns the span that changed, if any.
    pub fn resolve(&mut self, id: &BlockId, resolution: Resolution) -> Result<Option<Range<usize>>, ResolveError> {
        let review = self
            .chunks
            .get(id)
            .and_then(|c| c.review.clone())
            .ok_or_else(|| ResolveError::NotPending(id.clone()))?;

        let mut doc = self.ctx.document.write();
        let span = match (review, resolution) {
            (PendingReview::Conflict { after, .. }, Resolution::Accept) => {
                let block = doc.deserialize_block(&after)?;
                doc.replace_block(id, block)?;
                doc.block_span(id)
            }
            (PendingReview::Conflict { before, .. }, Resolution::Reject) => {
                // The chunk keeps the server's side, so the restored local
                // content is picked up as a local edit next round.
                let block = doc.deserialize_block(&before)?;
                doc.replace_block(id, block)?;
                doc.block_span(id)
            }
            (PendingReview::Deletion { .. }, Resolution::Accept) => {
                self.chunks.remove(id);
                info!("deletion of {} accepted", id);
                return Ok(None);
            }
            (PendingReview::Deletion { original, after }, Resolution::Reject) => {
                let anchor = after.filter(|a| doc.contains_block(a));
                let block = doc.deserialize_block(&original)?;
                doc.insert_block(anchor.as_ref(), block)?;
                // Forgotten by the cache: next round sends it as a local insert.
                self.chunks.remove(id);
                doc.block_span(id)
            }
        };
        if let Some(chunk) = self.chunks.get_mut(id) {
            chunk.clear_review();
        }
        info!("{} {} review", resolution, id);
        Ok(span)
    }
}

/// Mirror an applied transform into the remembered server structure.
fn track_remote<D: DocumentModel>(remote: &mut Skeleton, transform: &Transform, doc: &D) {
    match transform {
        Transform::Insert(t) => {
            // Behind the nearest live block the server already knows about.
            let ids = doc.block_ids();
            let after = ids
                .iter()
                .position(|i| *i == t.id)
                .and_then(|pos| ids[..pos].iter().rev().find(|i| remote.contains(i)));
            remote.place_after(Rib::new(t.id.clone(), t.version), after);
        }
        Transform::Update(t) => remote.set_version(&t.id, t.version),
        Transform::Delete(t) => {
            remote.remove(&t.id);
        }
        Transform::Style(_) | Transform::Failed(_) => {}
    }
}

fn parse_response(raw: &str) -> Result<ServerResponse, ManifestParseError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ribsync_doc::BlockStore;
    use ribsync_types::{BlockSnapshot, ManifestEntry};

    use crate::error::TransportError;

    /// Transport that is never reached by these tests.
    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn exchange(&self, _payload: OutboundPayload) -> Result<String, TransportError> {
            Err(TransportError::Closed)
        }

        async fn fetch(&self, _highest: SequenceNumber) -> Result<String, TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn id(s: &str) -> BlockId {
        BlockId::from(s)
    }

    fn session(blocks: &[(&str, &str)]) -> Session<BlockStore, Offline> {
        let doc = BlockStore::from_blocks(blocks.iter().map(|(i, t)| BlockSnapshot::text(id(i), *t))).unwrap();
        let mut session = Session::new(SharedDocument::new(doc), Offline, SyncConfig::default());
        let response = ServerResponse {
            highest_seq: 10,
            manifest: blocks.iter().map(|(i, _)| ManifestEntry::new(*i, 1)).collect(),
        };
        session.adopt_baseline(&response).unwrap();
        session
    }

    fn extract(session: &Session<BlockStore, Offline>) -> OutboundPayload {
        let doc = session.document().read();
        session.extract_local_changes(&*doc).unwrap()
    }

    #[test]
    fn test_baseline_has_nothing_to_send() {
        let s = session(&[("a", "one"), ("b", "two")]);
        assert_eq!(s.last_applied(), 10);
        assert_eq!(s.chunks().len(), 2);
        let payload = extract(&s);
        assert!(payload.is_empty());
        assert_eq!(payload.highest_fetched, 10);
    }

    #[test]
    fn test_extract_content_insert_delete() {
        let s = session(&[("a", "one"), ("b", "two"), ("c", "three")]);
        let new_id = {
            let mut doc = s.document().write();
            doc.set_text_local(&id("a"), "one!").unwrap();
            doc.remove_local(&id("c")).unwrap();
            doc.insert_local(Some(&id("a")), "fresh").unwrap()
        };

        let payload = extract(&s);
        let by_id = |want: &BlockId| payload.blocks.iter().find(|b| b.id == *want).unwrap();
        assert_eq!(payload.blocks.len(), 3);
        assert!(matches!(by_id(&id("a")).change, OutboundChange::Content { .. }));
        assert_eq!(by_id(&id("a")).base_version, 1);
        assert_eq!(by_id(&id("c")).change, OutboundChange::Deleted);
        match &by_id(&new_id).change {
            OutboundChange::Inserted { after, .. } => assert_eq!(after.as_ref(), Some(&id("a"))),
            other => panic!("expected insert, got {other:?}"),
        }
        assert_eq!(by_id(&new_id).base_version, 0);
    }

    #[test]
    fn test_sequence_guard_discards_redelivery() {
        let mut s = session(&[("a", "one")]);
        let cancel = CancellationToken::new();
        let batch = vec![
            Transform::update(12, &BlockSnapshot::text(id("a"), "two"), 2, 1).unwrap(),
            Transform::update(9, &BlockSnapshot::text(id("a"), "stale"), 1, 0).unwrap(),
        ];
        let first = s.apply_transforms(batch.clone(), &cancel);
        assert_eq!((first.applied, first.discarded), (1, 1));
        let second = s.apply_transforms(batch, &cancel);
        assert_eq!((second.applied, second.discarded), (0, 2));
        assert_eq!(s.document().read().text(&id("a")), Some("two"));
        assert_eq!(s.last_applied(), 12);
    }

    #[test]
    fn test_cancelled_batch_applies_nothing() {
        let mut s = session(&[("a", "one")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = s.apply_transforms(vec![Transform::failed(11, None, None)], &cancel);
        assert_eq!(outcome.aborted, 1);
        assert_eq!(s.last_applied(), 10);
    }

    #[test]
    fn test_applied_transforms_update_remote_structure() {
        let mut s = session(&[("a", "one"), ("b", "two"), ("c", "three")]);
        let cancel = CancellationToken::new();
        let outcome = s.apply_transforms(
            vec![
                Transform::insert(11, &BlockSnapshot::text(id("n"), "new"), 1, Some(id("a"))).unwrap(),
                Transform::update(12, &BlockSnapshot::text(id("b"), "two!"), 2, 1).unwrap(),
                Transform::delete(13, id("c"), 2),
            ],
            &cancel,
        );
        assert_eq!(outcome.applied, 3);

        let remote: Vec<&BlockId> = s.remote_skeleton().ids().collect();
        assert_eq!(remote, vec![&id("a"), &id("n"), &id("b")]);
        assert_eq!(s.remote_skeleton().version(&id("b")), Some(2));
        // Server blocks are not echoed back, even without a full round.
        assert!(extract(&s).is_empty());
    }

    #[test]
    fn test_cleared_hints_do_not_hide_edits() {
        let s = session(&[("a", "one"), ("b", "two")]);
        {
            let mut doc = s.document().write();
            doc.set_text_local(&id("b"), "two edited").unwrap();
            doc.clear_local_changes();
            assert!(doc.locally_changed_blocks().is_empty());
        }
        let payload = extract(&s);
        assert_eq!(payload.blocks.len(), 1);
        assert_eq!(payload.blocks[0].id, id("b"));
    }

    /// Document whose listed blocks serialize to something that is not a
    /// block payload, so no markup can be produced for them.
    struct Garbled {
        inner: BlockStore,
        garbled: HashSet<BlockId>,
    }

    impl DocumentModel for Garbled {
        type Block = BlockSnapshot;

        fn block_ids(&self) -> Vec<BlockId> {
            self.inner.block_ids()
        }
        fn contains_block(&self, id: &BlockId) -> bool {
            self.inner.contains_block(id)
        }
        fn serialize_block(&self, id: &BlockId) -> ribsync_doc::Result<String> {
            if self.garbled.contains(id) {
                return Ok("<w:p/>".into());
            }
            self.inner.serialize_block(id)
        }
        fn deserialize_block(&self, payload: &str) -> ribsync_doc::Result<BlockSnapshot> {
            self.inner.deserialize_block(payload)
        }
        fn replace_block(&mut self, id: &BlockId, block: BlockSnapshot) -> ribsync_doc::Result<()> {
            self.inner.replace_block(id, block)
        }
        fn insert_block(&mut self, after: Option<&BlockId>, block: BlockSnapshot) -> ribsync_doc::Result<()> {
            self.inner.insert_block(after, block)
        }
        fn delete_block(&mut self, id: &BlockId) -> ribsync_doc::Result<BlockSnapshot> {
            self.inner.delete_block(id)
        }
        fn block_span(&self, id: &BlockId) -> Option<Range<usize>> {
            self.inner.block_span(id)
        }
        fn apply_style(&mut self, target: Option<&BlockId>, style: &str) -> ribsync_doc::Result<Option<Range<usize>>> {
            self.inner.apply_style(target, style)
        }
    }

    #[test]
    fn test_delete_without_markup_breaks_block_pipeline() {
        let inner = BlockStore::from_blocks(vec![
            BlockSnapshot::text(id("a"), "one"),
            BlockSnapshot::text(id("b"), "two"),
        ])
        .unwrap();
        let doc = Garbled {
            inner,
            garbled: HashSet::from([id("a")]),
        };
        let mut s = Session::new(SharedDocument::new(doc), Offline, SyncConfig::default());
        let cancel = CancellationToken::new();
        let outcome = s.apply_transforms(
            vec![
                Transform::update(3, &BlockSnapshot::text(id("a"), "later"), 3, 2).unwrap(),
                Transform::delete(2, id("a"), 2),
                Transform::update(4, &BlockSnapshot::text(id("b"), "two!"), 2, 1).unwrap(),
            ],
            &cancel,
        );
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.highest_applied, 4);

        let doc = s.document().read();
        assert_eq!(doc.inner.text(&id("a")), Some("one"));
        assert_eq!(doc.inner.text(&id("b")), Some("two!"));
    }

    #[test]
    fn test_resolve_conflict_reject_restores_local() {
        let mut s = session(&[("a", "mine")]);
        s.document().write().set_text_local(&id("a"), "mine edited").unwrap();
        let cancel = CancellationToken::new();
        let outcome = s.apply_transforms(
            vec![Transform::update(11, &BlockSnapshot::text(id("a"), "theirs"), 2, 1).unwrap()],
            &cancel,
        );
        assert_eq!(outcome.applied, 1);
        assert_eq!(s.pending_reviews(), vec![id("a")]);
        assert!(extract(&s).is_empty());

        s.resolve(&id("a"), Resolution::Reject).unwrap();
        assert_eq!(s.document().read().text(&id("a")), Some("mine edited"));
        assert!(s.pending_reviews().is_empty());
        let payload = extract(&s);
        assert_eq!(payload.blocks.len(), 1);
        assert_eq!(payload.blocks[0].base_version, 2);
    }

    #[test]
    fn test_resolve_deletion_reject_reinserts() {
        let mut s = session(&[("a", "one"), ("b", "two"), ("c", "three")]);
        let cancel = CancellationToken::new();
        s.apply_transforms(vec![Transform::delete(11, id("b"), 2)], &cancel);
        assert!(!s.document().read().contains_block(&id("b")));

        let span = s.resolve(&id("b"), Resolution::Reject).unwrap();
        assert_eq!(span, Some(4..7));
        let ids = s.document().read().block_ids();
        assert_eq!(ids, vec![id("a"), id("b"), id("c")]);
        assert!(matches!(
            s.resolve(&id("b"), Resolution::Accept),
            Err(ResolveError::NotPending(_))
        ));
    }

    #[test]
    fn test_resolve_deletion_accept_drops_chunk() {
        let mut s = session(&[("a", "one"), ("b", "two")]);
        let cancel = CancellationToken::new();
        s.apply_transforms(vec![Transform::delete(11, id("b"), 2)], &cancel);
        assert_eq!(s.resolve(&id("b"), Resolution::Accept).unwrap(), None);
        assert!(!s.chunks().contains(&id("b")));
    }
}
