//! Skeleton differ: edit script between two orderings of block ids.
//!
//! Matching is by identity only; versions are ignored here (content
//! divergence is the state-chunk cache's business). Ids present in both
//! skeletons are kept in place along a longest increasing subsequence of
//! their source positions. Common ids off that subsequence become moves,
//! destination-only ids become inserts, source-only ids become deletes.
//!
//! Since ids are unique, the longest common subsequence reduces to the LIS
//! over source positions, which runs in O(n log n). Among equally long
//! candidates the one whose elements sit earliest in the source wins, so
//! ties resolve toward positional order.

use std::collections::{HashMap, HashSet};

use ribsync_types::BlockId;

use crate::skeleton::Skeleton;

/// One step of an edit script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffOp {
    /// Present in both, kept in relative order.
    Match { id: BlockId },
    /// Present only in the destination, placed after `after` (`None` = first).
    Insert { id: BlockId, after: Option<BlockId> },
    /// Present only in the source.
    Delete { id: BlockId },
    /// Present in both but reordered; placed after `after` in the destination.
    Move { id: BlockId, after: Option<BlockId> },
}

impl DiffOp {
    pub fn id(&self) -> &BlockId {
        match self {
            DiffOp::Match { id }
            | DiffOp::Insert { id, .. }
            | DiffOp::Delete { id }
            | DiffOp::Move { id, .. } => id,
        }
    }
}

/// Result of [`diff`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditScript {
    ops: Vec<DiffOp>,
}

impl EditScript {
    pub fn ops(&self) -> &[DiffOp] {
        &self.ops
    }

    /// No inserts, deletes or moves.
    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, DiffOp::Match { .. }))
    }

    pub fn matched(&self) -> impl Iterator<Item = &BlockId> {
        self.ops.iter().filter_map(|op| match op {
            DiffOp::Match { id } => Some(id),
            _ => None,
        })
    }

    pub fn inserted(&self) -> impl Iterator<Item = &BlockId> {
        self.ops.iter().filter_map(|op| match op {
            DiffOp::Insert { id, .. } => Some(id),
            _ => None,
        })
    }

    pub fn deleted(&self) -> impl Iterator<Item = &BlockId> {
        self.ops.iter().filter_map(|op| match op {
            DiffOp::Delete { id } => Some(id),
            _ => None,
        })
    }

    pub fn moved(&self) -> impl Iterator<Item = &BlockId> {
        self.ops.iter().filter_map(|op| match op {
            DiffOp::Move { id, .. } => Some(id),
            _ => None,
        })
    }

    /// Destination ids placed before `id`, nearest first. Empty when `id`
    /// is not in the destination.
    pub fn placed_before(&self, id: &BlockId) -> Vec<&BlockId> {
        let mut placed: Vec<&BlockId> = self
            .ops
            .iter()
            .filter(|op| !matches!(op, DiffOp::Delete { .. }))
            .map(DiffOp::id)
            .collect();
        let end = placed.iter().position(|p| *p == id).unwrap_or(0);
        placed.truncate(end);
        placed.reverse();
        placed
    }

    /// Destination predecessor of an inserted or moved id.
    ///
    /// Outer `None` = `id` is neither inserted nor moved.
    pub fn anchor_of(&self, id: &BlockId) -> Option<Option<&BlockId>> {
        self.ops.iter().find_map(|op| match op {
            DiffOp::Insert { id: i, after } | DiffOp::Move { id: i, after } if i == id => {
                Some(after.as_ref())
            }
            _ => None,
        })
    }
}

/// Compute the edit script turning `source` into `destination`.
pub fn diff(source: &Skeleton, destination: &Skeleton) -> EditScript {
    let src: Vec<&BlockId> = source.ids().collect();
    let dst: Vec<&BlockId> = destination.ids().collect();

    let src_pos: HashMap<&BlockId, usize> = src.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // Source positions of common ids, in destination order.
    let common: Vec<(usize, usize)> = dst
        .iter()
        .enumerate()
        .filter_map(|(d, id)| src_pos.get(id).map(|&s| (d, s)))
        .collect();
    let kept: HashSet<usize> = longest_increasing(&common.iter().map(|&(_, s)| s).collect::<Vec<_>>())
        .into_iter()
        .map(|i| common[i].0)
        .collect();

    let mut ops = Vec::with_capacity(src.len().max(dst.len()));
    let mut cursor = 0;
    let mut prev: Option<&BlockId> = None;

    for (d, id) in dst.iter().enumerate() {
        match src_pos.get(id) {
            Some(&s) if kept.contains(&d) => {
                // Source-only ids between the last kept block and this one.
                for gone in &src[cursor..s] {
                    if !destination.contains(gone) {
                        ops.push(DiffOp::Delete { id: (*gone).clone() });
                    }
                }
                cursor = s + 1;
                ops.push(DiffOp::Match { id: (*id).clone() });
            }
            Some(_) => ops.push(DiffOp::Move {
                id: (*id).clone(),
                after: prev.cloned(),
            }),
            None => ops.push(DiffOp::Insert {
                id: (*id).clone(),
                after: prev.cloned(),
            }),
        }
        prev = Some(id);
    }
    for gone in &src[cursor..] {
        if !destination.contains(gone) {
            ops.push(DiffOp::Delete { id: (*gone).clone() });
        }
    }

    EditScript { ops }
}

/// Indices (into `seq`) of a longest strictly increasing subsequence.
///
/// Patience sorting: `tails[k]` holds the index ending the best run of
/// length k+1, keeping the smallest possible tail value.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let k = tails.partition_point(|&t| seq[t] < value);
        if k > 0 {
            prev[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cur = tails.last().copied();
    while let Some(i) = cur {
        out.push(i);
        cur = prev[i];
    }
    out.reverse();
    out
}
