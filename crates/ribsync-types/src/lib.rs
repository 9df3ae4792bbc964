//! Shared block identity and wire types for ribsync.
//!
//! This crate is the leaf every other ribsync crate builds on: block ids, the
//! serialized block envelope, skeleton ribs, and the manifest / outbound
//! payload shapes exchanged with the server. It has **no internal ribsync
//! dependencies**.
//!
//! # Key Types
//!
//! |------------------------|----------------------------------------------|
//! | Type                   | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | [`BlockId`]            | Stable block identity, never reused          |
//! | [`BlockSnapshot`]      | Opaque serialized block (style + text)       |
//! | [`Rib`]                | Block identity + version inside a skeleton   |
//! | [`ManifestEntry`]      | One rib descriptor from the server manifest  |
//! | [`TransformDescriptor`]| One server-issued block operation            |
//! | [`OutboundPayload`]    | Locally changed blocks sent to the server    |
//! |------------------------|----------------------------------------------|

pub mod block;
pub mod ids;
pub mod manifest;

pub use block::{BlockSnapshot, PayloadError, Rib};
pub use ids::{BlockId, SECTION_PROPERTIES_ID};
pub use manifest::{
    ManifestEntry, OutboundBlock, OutboundChange, OutboundPayload, ServerResponse,
    TransformDescriptor, TransformKind,
};

/// Server-assigned, strictly increasing transform sequence number.
pub type SequenceNumber = u64;
