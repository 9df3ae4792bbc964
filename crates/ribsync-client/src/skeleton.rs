//! Skeletons: ordered block identities + versions at a point in time.
//!
//! A skeleton is built either from a server manifest or from the live
//! document. Once built it only changes while reconciling
//! ([`Skeleton::place_after`], [`Skeleton::set_version`], [`Skeleton::remove`]). The section-properties sentinel never appears in
//! a skeleton.
//!
//! # Cutoff peek
//!
//! [`Skeleton::build`] with a cutoff sequence number stops at the first rib
//! carrying a transform newer than the cutoff and returns
//! [`HasNewerStructuralChange`]. That is a cheap "has the server moved on?"
//! check, not a failure: callers use it before paying for a full diff. The
//! comparison is exclusive: a transform numbered exactly `cutoff` has already
//! been processed.

use std::collections::HashMap;

use ribsync_doc::DocumentModel;
use ribsync_types::{BlockId, ManifestEntry, Rib, SequenceNumber};
use thiserror::Error;
use tracing::{debug, trace};

use crate::state_chunk::StateChunkCache;

/// Early exit from [`Skeleton::build`]: the server has changes past the cutoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("block {id} has transform {snum} beyond cutoff {cutoff}")]
pub struct HasNewerStructuralChange {
    /// First rib found with a newer transform.
    pub id: BlockId,
    /// That transform's sequence number.
    pub snum: SequenceNumber,
    pub cutoff: SequenceNumber,
}

/// Ordered block identities with a version lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Skeleton {
    ribs: Vec<Rib>,
    versions: HashMap<BlockId, u64>,
}

impl Skeleton {
    /// Build from a server manifest.
    ///
    /// Deleted ribs are left out of the sequence (and logged). With `cutoff`
    /// set, returns early as soon as any transform's sequence number exceeds it.
    pub fn build(
        manifest: &[ManifestEntry],
        cutoff: Option<SequenceNumber>,
    ) -> Result<Self, HasNewerStructuralChange> {
        let mut skeleton = Self::default();
        for entry in manifest {
            if entry.id.is_section_properties() {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if let Some(snum) = entry.transforms.iter().map(|t| t.snum).find(|&s| s > cutoff) {
                    trace!("Skeleton build stopped at {} (snum {} > cutoff {})", entry.id, snum, cutoff);
                    return Err(HasNewerStructuralChange {
                        id: entry.id.clone(),
                        snum,
                        cutoff,
                    });
                }
            }
            if entry.deleted {
                debug!("Skeleton omits deleted rib {} (v{})", entry.id, entry.version);
                continue;
            }
            skeleton.push(entry.rib());
        }
        Ok(skeleton)
    }

    /// Build from a manifest without a cutoff. Never exits early.
    pub fn from_manifest(manifest: &[ManifestEntry]) -> Self {
        let mut skeleton = Self::default();
        for entry in manifest {
            if entry.id.is_section_properties() || entry.deleted {
                continue;
            }
            skeleton.push(entry.rib());
        }
        skeleton
    }

    /// Positional skeleton of a manifest that keeps deleted ribs.
    ///
    /// Used to anchor inserts: a block the server placed after a since-deleted
    /// block lands after that block's former position.
    pub fn ordering(manifest: &[ManifestEntry]) -> Self {
        Self::from_ribs(manifest.iter().map(ManifestEntry::rib))
    }

    /// Build from ribs as given (sentinel excluded, tombstones kept).
    pub fn from_ribs(ribs: impl IntoIterator<Item = Rib>) -> Self {
        let mut skeleton = Self::default();
        for rib in ribs {
            if !rib.id.is_section_properties() {
                skeleton.push(rib);
            }
        }
        skeleton
    }

    /// Build from the live document in document order.
    ///
    /// Versions come from the acknowledged state chunks; blocks never
    /// acknowledged by the server get version 0.
    pub fn from_document<D: DocumentModel>(doc: &D, chunks: &StateChunkCache) -> Self {
        Self::from_ribs(doc.block_ids().into_iter().map(|id| {
            let version = chunks.get(&id).map(|c| c.version).unwrap_or(0);
            Rib::new(id, version)
        }))
    }

    fn push(&mut self, rib: Rib) {
        if self.versions.insert(rib.id.clone(), rib.version).is_some() {
            // Ids are unique within a document; keep the first position.
            debug!("Skeleton ignores duplicate rib {}", rib.id);
            return;
        }
        self.ribs.push(rib);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn version(&self, id: &BlockId) -> Option<u64> {
        self.versions.get(id).copied()
    }

    pub fn count(&self) -> usize {
        self.ribs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ribs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Rib> {
        self.ribs.get(index)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.versions.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rib> {
        self.ribs.iter()
    }

    /// Block ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.ribs.iter().map(|r| &r.id)
    }

    /// Place `rib` right after `after` (`None` = first). An anchor not in
    /// the skeleton appends. A rib already present only takes the new version.
    pub fn place_after(&mut self, rib: Rib, after: Option<&BlockId>) {
        if self.contains(&rib.id) {
            self.set_version(&rib.id, rib.version);
            return;
        }
        let idx = match after {
            None => 0,
            Some(after) => self
                .ribs
                .iter()
                .position(|r| r.id == *after)
                .map_or(self.ribs.len(), |i| i + 1),
        };
        self.versions.insert(rib.id.clone(), rib.version);
        self.ribs.insert(idx, rib);
    }

    /// Bump a rib's version. No-op for unknown ids.
    pub fn set_version(&mut self, id: &BlockId, version: u64) {
        if let Some(v) = self.versions.get_mut(id) {
            *v = version;
            if let Some(rib) = self.ribs.iter_mut().find(|r| r.id == *id) {
                rib.version = version;
            }
        }
    }

    /// Remove a rib, returning it.
    pub fn remove(&mut self, id: &BlockId) -> Option<Rib> {
        self.versions.remove(id)?;
        let idx = self.ribs.iter().position(|r| r.id == *id)?;
        Some(self.ribs.remove(idx))
    }
}
