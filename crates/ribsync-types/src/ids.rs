//! Block identifiers.
//!
//! A [`BlockId`] is assigned once, when a block is created, and never reused.
//! Ids minted locally are UUIDv7 in simple hex form (time-ordered, globally
//! unique without coordination). Ids arriving from the server are opaque
//! strings and are carried through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Id of the magic rib that carries document-level section properties.
///
/// It appears in server manifests but is never a real content block, so
/// skeleton construction and diffing skip it.
pub const SECTION_PROPERTIES_ID: &str = "sectPr";

/// Stable, opaque block identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Wrap a raw id (as received from the server or the document model).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Mint a fresh id for a locally created block (UUIDv7, 32 hex chars).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().as_simple().to_string())
    }

    /// The section-properties sentinel.
    pub fn section_properties() -> Self {
        Self(SECTION_PROPERTIES_ID.to_string())
    }

    /// Whether this is the section-properties sentinel.
    pub fn is_section_properties(&self) -> bool {
        self.0 == SECTION_PROPERTIES_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for human display only, not lookup.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for BlockId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.short())
    }
}

// ============================================================================
// Tests
// ============================================================================
