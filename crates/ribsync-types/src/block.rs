//! Block envelope and skeleton ribs.
//!
//! The engine never looks inside a block beyond its [`BlockSnapshot`]: an id,
//! an optional style reference, and the text. The serialized form of a
//! snapshot (JSON) is the opaque payload that travels to and from the server
//! and that tracked-change markup is rendered into.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BlockId;

/// Error decoding or encoding a serialized block payload.
#[derive(Error, Debug)]
#[error("malformed block payload: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

/// Serializable state of one content block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    /// Block identity.
    pub id: BlockId,
    /// Named paragraph/run style, if any. Formatting-only changes touch this alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Primary text content.
    pub text: String,
}

impl BlockSnapshot {
    /// Create an unstyled text block.
    pub fn text(id: BlockId, text: impl Into<String>) -> Self {
        Self {
            id,
            style: None,
            text: text.into(),
        }
    }

    /// Builder-style setter for the style reference.
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Encode to the opaque textual payload.
    pub fn to_payload(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the opaque textual payload.
    pub fn from_payload(payload: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Character length of the text (what offsets in a document count).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One entry of a skeleton: identity, version, and tombstone flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rib {
    pub id: BlockId,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
}

impl Rib {
    pub fn new(id: impl Into<BlockId>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            deleted: false,
        }
    }

    /// A tombstoned rib (block deleted on the server).
    pub fn tombstone(id: impl Into<BlockId>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            deleted: true,
        }
    }
}
