//! Error taxonomy for sync rounds.
//!
//! Round-level errors ([`SyncError`]) abort the round before anything in the
//! document is touched. Per-transform errors ([`ApplyError`]) are isolated:
//! logged, counted in the round report, and the batch carries on.

use ribsync_doc::DocError;
use ribsync_types::{BlockId, SequenceNumber, TransformKind};
use thiserror::Error;

/// Network or authentication failure. Retryable by user action.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("transport closed")]
    Closed,
}

/// Malformed skeleton or transform payload from the server.
#[derive(Error, Debug)]
pub enum ManifestParseError {
    #[error("malformed server response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{op} transform {snum} on block {id} is missing {field}")]
    MissingField {
        snum: SequenceNumber,
        op: TransformKind,
        id: BlockId,
        field: &'static str,
    },

    #[error("{op} transform {snum} on block {id} carries a malformed payload: {reason}")]
    Payload {
        snum: SequenceNumber,
        op: TransformKind,
        id: BlockId,
        reason: String,
    },
}

/// Tracked-change markup could not be produced for a block.
#[derive(Error, Debug)]
#[error("markup for block {id} failed: {reason}")]
pub struct MarkupError {
    pub id: BlockId,
    pub reason: String,
}

/// A single transform failed to apply.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// Delete reached `apply` without a marked-up version. Internal invariant
    /// violation: deleting without markup would destroy visible history.
    #[error("delete of block {0} has no marked-up version")]
    MissingMarkup(BlockId),

    /// Transform references a block absent from the live document.
    #[error("transform targets block {0} which is not in the document")]
    TargetNotFound(BlockId),

    /// Transform already reached Applied or Failed.
    #[error("transform {0} already reached a terminal state")]
    Terminal(SequenceNumber),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error("document error: {0}")]
    Document(#[from] DocError),
}

/// Received sequence number is not after the last applied one.
///
/// Not surfaced to the user: the transform is re-delivery and is discarded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sequence number {seq} is not after last applied {last_applied}")]
pub struct SequenceRegression {
    pub seq: SequenceNumber,
    pub last_applied: SequenceNumber,
}

/// Errors that abort a whole round.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("manifest parse error: {0}")]
    ManifestParse(#[from] ManifestParseError),

    #[error("document error: {0}")]
    Document(#[from] DocError),

    #[error("round cancelled before any change was applied")]
    Cancelled,
}

/// Errors resolving a pending review.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("block {0} has no change awaiting review")]
    NotPending(BlockId),

    #[error("document error: {0}")]
    Document(#[from] DocError),
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
