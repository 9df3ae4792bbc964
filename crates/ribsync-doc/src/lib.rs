//! Block document model for ribsync.
//!
//! The sync engine treats the live document as an external collaborator. It
//! needs exactly the operations on [`DocumentModel`]: serialize a block,
//! deserialize a payload into a block handle, and replace / insert / delete
//! blocks by id. This crate defines that seam and ships [`BlockStore`], an
//! arena implementation keyed by [`BlockId`] that editors can use directly.
//!
//! # Design Philosophy
//!
//! Blocks live in an indexed table, never in a tree of owning pointers. Views
//! and transforms hold `BlockId` handles. Document order comes from fractional
//! order keys, so inserting between two blocks never renumbers the others.
//!
//! Access from the sync worker and the UI goes through [`SharedDocument`], a
//! single-writer / multiple-reader lock.

mod error;
mod model;
mod order;
mod shared;
mod store;

pub use error::DocError;
pub use model::DocumentModel;
pub use ribsync_types::{BlockId, BlockSnapshot};
pub use shared::SharedDocument;
pub use store::BlockStore;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocError>;
