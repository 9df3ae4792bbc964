//! Wire types exchanged with the server.
//!
//! ```text
//!   client                                  server
//!   ┌───────────────────────┐  Outbound     ┌──────────────────────────┐
//!   │ changed blocks        │ ───────────▶  │ commit, assign seq nums  │
//!   │ highest_fetched       │               │                          │
//!   │                       │  Response     │                          │
//!   │ apply transforms      │ ◀───────────  │ manifest + highest_seq   │
//!   └───────────────────────┘               └──────────────────────────┘
//! ```
//!
//! The manifest is an ordered list of rib descriptors. Each descriptor carries
//! the transforms the server has recorded against that block; the client turns
//! them into executable transforms and applies them in sequence order.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{BlockId, Rib, SequenceNumber};

/// Which operation a transform performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransformKind {
    /// Replace a block's content.
    Update,
    /// Add a new block.
    Insert,
    /// Remove a block (carries only an id reference).
    Delete,
    /// Formatting-only change.
    Style,
    /// The server could not complete an operation this client attempted.
    Failed,
}

impl TransformKind {
    /// Whether this kind changes block presence or order.
    pub fn is_structural(&self) -> bool {
        matches!(self, TransformKind::Insert | TransformKind::Delete)
    }
}

/// One server-recorded operation against a rib.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    pub op: TransformKind,
    /// Server-assigned sequence number.
    pub snum: SequenceNumber,
    /// Changeset (commit group) number.
    #[serde(default)]
    pub changeset: u64,
    /// Target block for id-reference-only ops (Delete, Style, Failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idref: Option<BlockId>,
    /// Serialized [`crate::BlockSnapshot`] for Update / Insert.
    #[serde(default, rename = "sdtPayload", skip_serializing_if = "Option::is_none")]
    pub sdt_payload: Option<String>,
    /// Explicit insertion anchor. Absent = derive from the skeleton diff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<BlockId>,
    /// Version the change was computed against. Absent = entry version - 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    /// Style reference for Style ops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Client id that submitted the change, when the server echoes it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Human-readable reason for Failed ops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransformDescriptor {
    /// Bare descriptor; fill the optional fields with struct update syntax.
    pub fn new(op: TransformKind, snum: SequenceNumber) -> Self {
        Self {
            op,
            snum,
            changeset: 0,
            idref: None,
            sdt_payload: None,
            after: None,
            base_version: None,
            style: None,
            origin: None,
            reason: None,
        }
    }
}

/// One rib descriptor of the server manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: BlockId,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub transforms: Vec<TransformDescriptor>,
}

impl ManifestEntry {
    pub fn new(id: impl Into<BlockId>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            deleted: false,
            transforms: Vec::new(),
        }
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn with_transform(mut self, transform: TransformDescriptor) -> Self {
        self.transforms.push(transform);
        self
    }

    /// The rib this entry describes.
    pub fn rib(&self) -> Rib {
        Rib {
            id: self.id.clone(),
            version: self.version,
            deleted: self.deleted,
        }
    }

    /// Highest sequence number among this entry's transforms.
    pub fn max_snum(&self) -> Option<SequenceNumber> {
        self.transforms.iter().map(|t| t.snum).max()
    }
}

/// Server reply to a transmission or fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    /// Server's current highest sequence number.
    pub highest_seq: SequenceNumber,
    /// Ordered rib descriptors.
    #[serde(default)]
    pub manifest: Vec<ManifestEntry>,
}

/// What changed about an outbound block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutboundChange {
    /// Content edited in place.
    Content { payload: String },
    /// New local block (or moved block) positioned after `after`.
    Inserted {
        after: Option<BlockId>,
        payload: String,
    },
    /// Block removed locally.
    Deleted,
}

/// One locally changed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundBlock {
    pub id: BlockId,
    /// Acknowledged version the change was made against (0 = never acknowledged).
    pub base_version: u64,
    pub change: OutboundChange,
}

/// Everything a round transmits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub document_id: String,
    pub client_id: String,
    /// Highest sequence number this client has processed.
    pub highest_fetched: SequenceNumber,
    pub blocks: Vec<OutboundBlock>,
}

impl OutboundPayload {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
