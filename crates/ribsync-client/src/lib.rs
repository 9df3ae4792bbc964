//! ribsync client engine
//!
//! Keeps a local block document consistent with a server-authoritative copy
//! that other clients edit concurrently. Sync works on whole blocks: each
//! round transmits locally changed blocks and applies the server's ordered
//! transforms (update, insert, delete, style, failed). Conflicts become
//! tracked-change markup for a human to accept or reject.
//!
//! Start with [`Session`] for a single round at a time, or [`spawn_worker`]
//! to run rounds on a background task and receive [`RoundEvent`]s.

pub mod changeset;
pub mod config;
pub mod differ;
pub mod dirty;
pub mod error;
pub mod session;
pub mod skeleton;
pub mod state_chunk;
pub mod transform;
pub mod transport;
pub mod worker;

pub use changeset::{ChangeSpan, Changeset, SpanTag};
pub use config::{MarkupStyle, SyncConfig};
pub use differ::{diff, DiffOp, EditScript};
pub use dirty::DirtyRegion;
pub use error::{
    ApplyError, ConfigError, ManifestParseError, MarkupError, ResolveError, SequenceRegression,
    SyncError, TransportError,
};
pub use session::{BatchOutcome, Resolution, RoundReport, Session, SessionContext};
pub use skeleton::{HasNewerStructuralChange, Skeleton};
pub use state_chunk::{divergence, Divergence, PendingReview, Snapshot, StateChunk, StateChunkCache};
pub use transform::{ApplyContext, Transform, TransformMeta, TransformState};
pub use transport::Transport;
pub use worker::{spawn_worker, RoundEvent, SyncHandle, WorkerError};
