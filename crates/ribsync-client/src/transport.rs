//! Transport seam: the abstract send/receive channel to the server.
//!
//! The engine hands the transport an [`OutboundPayload`] and gets back the raw
//! server reply; parsing that reply is the engine's job, so a malformed reply
//! surfaces as a manifest parse error rather than a transport error.
//!
//! No timeout is imposed here. Implementations own their timeout and retry
//! policy and report exhaustion as [`TransportError`].

use std::sync::Arc;

use async_trait::async_trait;
use ribsync_types::{OutboundPayload, SequenceNumber};

use crate::error::TransportError;

/// Channel to the authoritative server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit local changes; returns the server's serialized response
    /// (manifest with transforms past `payload.highest_fetched`).
    async fn exchange(&self, payload: OutboundPayload) -> Result<String, TransportError>;

    /// Fetch the manifest without transmitting anything.
    async fn fetch(&self, highest_fetched: SequenceNumber) -> Result<String, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn exchange(&self, payload: OutboundPayload) -> Result<String, TransportError> {
        (**self).exchange(payload).await
    }

    async fn fetch(&self, highest_fetched: SequenceNumber) -> Result<String, TransportError> {
        (**self).fetch(highest_fetched).await
    }
}
