//! Transforms: server-issued block operations and how they apply.
//!
//! Every transform starts `Pending` and ends `Applied` or `Failed`; there is
//! no way back from a terminal state. A later transform with a higher
//! sequence number supersedes an earlier one, it never retries it.
//!
//! ```text
//!                 apply() Ok
//!   ┌─────────┐ ─────────────▶ ┌─────────┐
//!   │ Pending │                │ Applied │
//!   └─────────┘ ─────────────▶ ├─────────┤
//!                 apply() Err  │ Failed  │
//!                              └─────────┘
//! ```
//!
//! Transforms flagged `local` echo this client's own submissions. They only
//! acknowledge state chunks; the live document already holds that content.
//!
//! A conflicting update replaces the live block with a single marked-up block
//! (deleted local words, inserted server words) instead of placing a second
//! block beside it. Both sides stay in the chunk's [`PendingReview`], and
//! accept or reject writes one of them back.

use std::ops::Range;

use ribsync_doc::DocumentModel;
use ribsync_types::{
    BlockId, BlockSnapshot, ManifestEntry, PayloadError, SequenceNumber, TransformDescriptor, TransformKind,
};
use strum::Display;
use tracing::{debug, trace, warn};

use crate::changeset::Changeset;
use crate::config::MarkupStyle;
use crate::differ::EditScript;
use crate::dirty::DirtyRegion;
use crate::error::{ApplyError, ManifestParseError, MarkupError};
use crate::state_chunk::{PendingReview, StateChunk, StateChunkCache, divergence, Divergence};

/// Lifecycle of a transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransformState {
    #[default]
    Pending,
    Applied,
    Failed,
}

impl TransformState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransformState::Pending)
    }
}

/// Fields shared by every variant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformMeta {
    pub seq: SequenceNumber,
    /// Commit group this transform was recorded in.
    pub changeset: u64,
    /// Echo of this client's own submission.
    pub local: bool,
    pub state: TransformState,
    /// Tracked-change rendering produced by [`Transform::markup_changes`].
    pub markup: Option<String>,
}

impl TransformMeta {
    fn new(seq: SequenceNumber) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }
}

/// Replace a block's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateTransform {
    pub meta: TransformMeta,
    pub id: BlockId,
    pub payload: String,
    /// Version after this update.
    pub version: u64,
    /// Version the update was computed against.
    pub base_version: u64,
}

/// Add a block after `after` (`None` = start of document).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertTransform {
    pub meta: TransformMeta,
    pub id: BlockId,
    pub payload: String,
    pub version: u64,
    pub after: Option<BlockId>,
    /// Blocks before this one in the server ordering, nearest first. Used
    /// when `after` is no longer in the live document.
    pub preceding: Vec<BlockId>,
}

/// Remove a block. Carries only the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteTransform {
    pub meta: TransformMeta,
    pub id: BlockId,
    pub version: u64,
}

/// Formatting-only change. `target = None` styles the whole document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleTransform {
    pub meta: TransformMeta,
    pub target: Option<BlockId>,
    pub style: String,
    pub version: u64,
}

/// The server could not complete something this client attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTransform {
    pub meta: TransformMeta,
    pub id: Option<BlockId>,
    pub reason: Option<String>,
}

/// One executable block operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    Update(UpdateTransform),
    Insert(InsertTransform),
    Delete(DeleteTransform),
    Style(StyleTransform),
    Failed(FailedTransform),
}

/// What a transform mutates while applying.
pub struct ApplyContext<'a, D> {
    pub doc: &'a mut D,
    pub chunks: &'a mut StateChunkCache,
    pub dirty: &'a mut DirtyRegion,
    pub markup: &'a MarkupStyle,
}

fn normalize_payload(
    desc: &TransformDescriptor,
    id: &BlockId,
) -> Result<String, ManifestParseError> {
    let raw = desc
        .sdt_payload
        .as_deref()
        .ok_or_else(|| ManifestParseError::MissingField {
            snum: desc.snum,
            op: desc.op,
            id: id.clone(),
            field: "sdtPayload",
        })?;
    let bad = |reason: String| ManifestParseError::Payload {
        snum: desc.snum,
        op: desc.op,
        id: id.clone(),
        reason,
    };
    let mut snapshot = BlockSnapshot::from_payload(raw).map_err(|e| bad(e.to_string()))?;
    if snapshot.id != *id {
        trace!("payload id {} rebound to rib {}", snapshot.id, id);
        snapshot.id = id.clone();
    }
    snapshot.to_payload().map_err(|e| bad(e.to_string()))
}

impl Transform {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Build from a manifest descriptor.
    ///
    /// Block payloads are validated and rebound to the rib id. An insert
    /// without an explicit anchor takes its predecessor from `anchors`, the
    /// diff between the last known remote skeleton and the incoming ordering.
    pub fn from_descriptor(
        entry: &ManifestEntry,
        desc: &TransformDescriptor,
        client_id: &str,
        anchors: &EditScript,
    ) -> Result<Self, ManifestParseError> {
        let meta = TransformMeta {
            seq: desc.snum,
            changeset: desc.changeset,
            local: desc.origin.as_deref() == Some(client_id),
            ..TransformMeta::default()
        };
        let target = desc.idref.clone().unwrap_or_else(|| entry.id.clone());

        let transform = match desc.op {
            TransformKind::Update => Transform::Update(UpdateTransform {
                meta,
                payload: normalize_payload(desc, &entry.id)?,
                id: entry.id.clone(),
                version: entry.version,
                base_version: desc
                    .base_version
                    .unwrap_or_else(|| entry.version.saturating_sub(1)),
            }),
            TransformKind::Insert => {
                let after = match &desc.after {
                    Some(after) => Some(after.clone()),
                    None => anchors.anchor_of(&entry.id).flatten().cloned(),
                };
                Transform::Insert(InsertTransform {
                    meta,
                    payload: normalize_payload(desc, &entry.id)?,
                    id: entry.id.clone(),
                    version: entry.version,
                    after,
                    preceding: anchors.placed_before(&entry.id).into_iter().cloned().collect(),
                })
            }
            TransformKind::Delete => Transform::Delete(DeleteTransform {
                meta,
                id: target,
                version: entry.version,
            }),
            TransformKind::Style => Transform::Style(StyleTransform {
                meta,
                style: desc.style.clone().ok_or_else(|| ManifestParseError::MissingField {
                    snum: desc.snum,
                    op: desc.op,
                    id: target.clone(),
                    field: "style",
                })?,
                target: (!target.is_section_properties()).then_some(target),
                version: entry.version,
            }),
            TransformKind::Failed => Transform::Failed(FailedTransform {
                meta,
                id: Some(target),
                reason: desc.reason.clone(),
            }),
        };
        Ok(transform)
    }

    /// Update to `snapshot`, computed against `base_version`.
    pub fn update(
        seq: SequenceNumber,
        snapshot: &BlockSnapshot,
        version: u64,
        base_version: u64,
    ) -> Result<Self, PayloadError> {
        Ok(Transform::Update(UpdateTransform {
            meta: TransformMeta::new(seq),
            id: snapshot.id.clone(),
            payload: snapshot.to_payload()?,
            version,
            base_version,
        }))
    }

    pub fn insert(
        seq: SequenceNumber,
        snapshot: &BlockSnapshot,
        version: u64,
        after: Option<BlockId>,
    ) -> Result<Self, PayloadError> {
        Ok(Transform::Insert(InsertTransform {
            meta: TransformMeta::new(seq),
            id: snapshot.id.clone(),
            payload: snapshot.to_payload()?,
            version,
            after,
            preceding: Vec::new(),
        }))
    }

    pub fn delete(seq: SequenceNumber, id: BlockId, version: u64) -> Self {
        Transform::Delete(DeleteTransform {
            meta: TransformMeta::new(seq),
            id,
            version,
        })
    }

    pub fn style(seq: SequenceNumber, target: Option<BlockId>, style: impl Into<String>) -> Self {
        Transform::Style(StyleTransform {
            meta: TransformMeta::new(seq),
            target,
            style: style.into(),
            version: 0,
        })
    }

    pub fn failed(seq: SequenceNumber, id: Option<BlockId>, reason: Option<String>) -> Self {
        Transform::Failed(FailedTransform {
            meta: TransformMeta::new(seq),
            id,
            reason,
        })
    }

    /// Mark as an echo of this client's own submission.
    pub fn into_local(mut self) -> Self {
        self.meta_mut().local = true;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn meta(&self) -> &TransformMeta {
        match self {
            Transform::Update(t) => &t.meta,
            Transform::Insert(t) => &t.meta,
            Transform::Delete(t) => &t.meta,
            Transform::Style(t) => &t.meta,
            Transform::Failed(t) => &t.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut TransformMeta {
        match self {
            Transform::Update(t) => &mut t.meta,
            Transform::Insert(t) => &mut t.meta,
            Transform::Delete(t) => &mut t.meta,
            Transform::Style(t) => &mut t.meta,
            Transform::Failed(t) => &mut t.meta,
        }
    }

    pub fn seq(&self) -> SequenceNumber {
        self.meta().seq
    }

    pub fn changeset(&self) -> u64 {
        self.meta().changeset
    }

    pub fn is_local(&self) -> bool {
        self.meta().local
    }

    pub fn state(&self) -> TransformState {
        self.meta().state
    }

    pub fn is_applied(&self) -> bool {
        self.state() == TransformState::Applied
    }

    pub fn markup(&self) -> Option<&str> {
        self.meta().markup.as_deref()
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Update(_) => TransformKind::Update,
            Transform::Insert(_) => TransformKind::Insert,
            Transform::Delete(_) => TransformKind::Delete,
            Transform::Style(_) => TransformKind::Style,
            Transform::Failed(_) => TransformKind::Failed,
        }
    }

    /// The block this transform is about. Resolves for deletes too, which
    /// carry only an id reference. `None` for document-level styles.
    pub fn target(&self) -> Option<&BlockId> {
        match self {
            Transform::Update(t) => Some(&t.id),
            Transform::Insert(t) => Some(&t.id),
            Transform::Delete(t) => Some(&t.id),
            Transform::Style(t) => t.target.as_ref(),
            Transform::Failed(t) => t.id.as_ref(),
        }
    }

    // =========================================================================
    // Markup
    // =========================================================================

    /// Render `changeset` into a copy of `original` for review.
    ///
    /// The copy keeps the original's id and style; its text becomes the
    /// marked-up changeset. Returns `None` when `original` is not a valid
    /// block payload. The result is kept on the transform.
    pub fn markup_changes(&mut self, original: &str, changeset: &Changeset, style: &MarkupStyle) -> Option<String> {
        let mut snapshot = match BlockSnapshot::from_payload(original) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("transform {}: no markup, {}", self.seq(), e);
                return None;
            }
        };
        snapshot.text = changeset.render(style);
        let markup = snapshot.to_payload().ok()?;
        self.meta_mut().markup = Some(markup.clone());
        Some(markup)
    }

    /// Produce the struck-through copy a delete needs before it can apply.
    ///
    /// No-op for other variants and for local deletes (nothing to review).
    pub fn prepare_markup<D: DocumentModel>(&mut self, doc: &D, style: &MarkupStyle) -> Result<(), MarkupError> {
        let Transform::Delete(t) = self else {
            return Ok(());
        };
        if t.meta.local || t.meta.markup.is_some() || !doc.contains_block(&t.id) {
            return Ok(());
        }
        let id = t.id.clone();
        let original = doc.serialize_block(&id).map_err(|e| MarkupError {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        let text = BlockSnapshot::from_payload(&original)
            .map(|s| s.text)
            .map_err(|e| MarkupError {
                id: id.clone(),
                reason: e.to_string(),
            })?;
        self.markup_changes(&original, &Changeset::deletion(&text), style)
            .map(|_| ())
            .ok_or_else(|| MarkupError {
                id,
                reason: "block payload could not be marked up".into(),
            })
    }

    // =========================================================================
    // Apply
    // =========================================================================

    /// Apply against the live document and the state-chunk cache.
    ///
    /// On success returns the sequence number and moves to `Applied`; on error
    /// moves to `Failed`. Touched spans are added to `ctx.dirty`.
    pub fn apply<D: DocumentModel>(&mut self, ctx: &mut ApplyContext<'_, D>) -> Result<SequenceNumber, ApplyError> {
        let seq = self.seq();
        if self.state().is_terminal() {
            return Err(ApplyError::Terminal(seq));
        }
        let result = match self {
            Transform::Update(t) => t.apply(ctx),
            Transform::Insert(t) => t.apply(ctx),
            Transform::Delete(t) => t.apply(ctx),
            Transform::Style(t) => t.apply(ctx),
            Transform::Failed(t) => {
                warn!(
                    "server rejected change to {}: {}",
                    t.id.as_ref().map(BlockId::to_string).unwrap_or_else(|| "document".into()),
                    t.reason.as_deref().unwrap_or("no reason given")
                );
                Ok(())
            }
        };
        let meta = self.meta_mut();
        match result {
            Ok(()) => {
                meta.state = TransformState::Applied;
                Ok(seq)
            }
            Err(e) => {
                meta.state = TransformState::Failed;
                Err(e)
            }
        }
    }
}

fn record_span(dirty: &mut DirtyRegion, span: Option<Range<usize>>) {
    trace!("dirty span {:?}", span);
    dirty.extend(span);
}

impl UpdateTransform {
    fn apply<D: DocumentModel>(&mut self, ctx: &mut ApplyContext<'_, D>) -> Result<(), ApplyError> {
        if !ctx.doc.contains_block(&self.id) {
            return Err(ApplyError::TargetNotFound(self.id.clone()));
        }
        if self.meta.local {
            ctx.chunks.acknowledge(self.id.clone(), self.payload.clone(), self.version);
            return Ok(());
        }

        let cached = ctx.chunks.get(&self.id);
        let cached_version = cached.map(|c| c.version).unwrap_or(0);
        // A block still under conflict review competes with the user's side.
        let (local_payload, under_review) = match cached.and_then(|c| c.review.as_ref()) {
            Some(PendingReview::Conflict { before, .. }) => (before.clone(), true),
            _ => (ctx.doc.serialize_block(&self.id)?, false),
        };
        let live = StateChunk::new(self.id.clone(), local_payload.clone(), cached_version);
        let pending_local = under_review
            || cached.is_some_and(|c| divergence(&live, c) == Divergence::LocalOnly);

        let known = StateChunk::new(self.id.clone(), self.payload.clone(), self.base_version);
        let d = divergence(&live, &known);
        let conflict = d == Divergence::Conflict || (pending_local && d != Divergence::Unchanged);

        if conflict {
            let markup_error = |reason: String| MarkupError {
                id: self.id.clone(),
                reason,
            };
            let before = BlockSnapshot::from_payload(&local_payload).map_err(|e| markup_error(e.to_string()))?;
            let after = BlockSnapshot::from_payload(&self.payload).map_err(|e| markup_error(e.to_string()))?;
            let changeset = Changeset::between(&before.text, &after.text);

            let mut snapshot = before;
            snapshot.text = changeset.render(ctx.markup);
            let markup = snapshot.to_payload().map_err(|e| markup_error(e.to_string()))?;
            self.meta.markup = Some(markup.clone());

            let block = ctx.doc.deserialize_block(&markup)?;
            ctx.doc.replace_block(&self.id, block)?;
            warn!(
                "conflict on {} (local v{} vs base v{}): both sides kept for review",
                self.id, cached_version, self.base_version
            );
            ctx.chunks.insert(StateChunk::new(self.id.clone(), self.payload.clone(), self.version).with_review(
                markup,
                PendingReview::Conflict {
                    before: local_payload,
                    after: self.payload.clone(),
                },
            ));
        } else {
            let block = ctx.doc.deserialize_block(&self.payload)?;
            ctx.doc.replace_block(&self.id, block)?;
            ctx.chunks.acknowledge(self.id.clone(), self.payload.clone(), self.version);
            debug!("updated {} to v{} ({})", self.id, self.version, d);
        }
        record_span(ctx.dirty, ctx.doc.block_span(&self.id));
        Ok(())
    }
}

impl InsertTransform {
    fn apply<D: DocumentModel>(&mut self, ctx: &mut ApplyContext<'_, D>) -> Result<(), ApplyError> {
        if self.meta.local {
            ctx.chunks.acknowledge(self.id.clone(), self.payload.clone(), self.version);
            return Ok(());
        }
        if ctx.doc.contains_block(&self.id) {
            return Err(ribsync_doc::DocError::DuplicateBlock(self.id.clone()).into());
        }
        let anchor = self.live_anchor(&*ctx.doc, ctx.chunks)?;
        if anchor != self.after {
            debug!(
                "insert {}: anchor {:?} gone, placing after {:?}",
                self.id,
                self.after.as_ref().map(BlockId::short),
                anchor.as_ref().map(BlockId::short)
            );
        }
        let block = ctx.doc.deserialize_block(&self.payload)?;
        ctx.doc.insert_block(anchor.as_ref(), block)?;
        ctx.chunks.acknowledge(self.id.clone(), self.payload.clone(), self.version);
        debug!(
            "inserted {} after {}",
            self.id,
            anchor.as_ref().map(BlockId::short).unwrap_or("start")
        );
        record_span(ctx.dirty, ctx.doc.block_span(&self.id));
        Ok(())
    }

    /// Nearest block before this one that is still in the live document.
    ///
    /// Tries `after`, then the server-order predecessors. A block deleted
    /// under review is followed back to where it stood. `None` places the
    /// block first; an anchor that cannot be placed at all is an error.
    fn live_anchor<D: DocumentModel>(&self, doc: &D, chunks: &StateChunkCache) -> Result<Option<BlockId>, ApplyError> {
        let Some(after) = &self.after else {
            return Ok(None);
        };
        for candidate in std::iter::once(after).chain(&self.preceding) {
            let mut current = candidate.clone();
            for _ in 0..=chunks.len() {
                if doc.contains_block(&current) {
                    return Ok(Some(current));
                }
                match chunks.get(&current).and_then(|c| c.review.as_ref()) {
                    Some(PendingReview::Deletion { after: Some(prev), .. }) => current = prev.clone(),
                    Some(PendingReview::Deletion { after: None, .. }) => return Ok(None),
                    _ => break,
                }
            }
        }
        if self.preceding.is_empty() {
            Err(ApplyError::TargetNotFound(after.clone()))
        } else {
            // Nothing before it survives.
            Ok(None)
        }
    }
}

impl DeleteTransform {
    fn apply<D: DocumentModel>(&mut self, ctx: &mut ApplyContext<'_, D>) -> Result<(), ApplyError> {
        if self.meta.local {
            ctx.chunks.remove(&self.id);
            return Ok(());
        }
        if !ctx.doc.contains_block(&self.id) {
            return Err(ApplyError::TargetNotFound(self.id.clone()));
        }
        let Some(markup) = self.meta.markup.clone() else {
            tracing::error!("delete {} of {} reached apply without markup", self.meta.seq, self.id);
            return Err(ApplyError::MissingMarkup(self.id.clone()));
        };

        let ids = ctx.doc.block_ids();
        let after = ids
            .iter()
            .position(|id| *id == self.id)
            .and_then(|i| i.checked_sub(1))
            .map(|i| ids[i].clone());
        let span = ctx.doc.block_span(&self.id);
        let original = ctx.doc.serialize_block(&self.id)?;

        let marked = ctx.doc.deserialize_block(&markup)?;
        ctx.doc.replace_block(&self.id, marked)?;
        ctx.doc.delete_block(&self.id)?;

        ctx.chunks.insert(
            StateChunk::new(self.id.clone(), original.clone(), self.version)
                .with_review(markup, PendingReview::Deletion { original, after }),
        );
        debug!("deleted {}, kept marked-up copy for review", self.id);
        record_span(ctx.dirty, span);
        Ok(())
    }
}

impl StyleTransform {
    fn apply<D: DocumentModel>(&mut self, ctx: &mut ApplyContext<'_, D>) -> Result<(), ApplyError> {
        let span = ctx.doc.apply_style(self.target.as_ref(), &self.style)?;
        if span.is_none() {
            debug!("style {} matched nothing", self.style);
            return Ok(());
        }
        // Keep the acknowledged copy in step so the restyle is not mistaken
        // for a local edit next round.
        if let Some(chunk) = self.target.as_ref().and_then(|id| ctx.chunks.get_mut(id)) {
            if let Ok(mut snapshot) = BlockSnapshot::from_payload(chunk.payload()) {
                snapshot.style = Some(self.style.clone());
                if let Ok(payload) = snapshot.to_payload() {
                    chunk.set_payload(payload);
                    chunk.version = chunk.version.max(self.version);
                }
            }
        }
        record_span(ctx.dirty, span);
        Ok(())
    }
}
