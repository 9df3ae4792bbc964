//! Shared fixtures: a scripted transport and manifest builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ribsync_client::{Session, SyncConfig, Transport, TransportError};
use ribsync_doc::{BlockStore, DocumentModel, SharedDocument};
use ribsync_types::{
    BlockId, BlockSnapshot, ManifestEntry, OutboundPayload, SequenceNumber, ServerResponse,
    TransformDescriptor, TransformKind,
};
use tokio_util::sync::CancellationToken;

/// Transport that replays canned replies and records what it was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    pub sent: Mutex<Vec<OutboundPayload>>,
    pub fetches: Mutex<Vec<SequenceNumber>>,
    /// Never answer `exchange`.
    stall: bool,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            stall: true,
            ..Self::default()
        })
    }

    pub fn reply(&self, response: &ServerResponse) {
        self.replies
            .lock()
            .push_back(Ok(serde_json::to_string(response).unwrap()));
    }

    pub fn reply_raw(&self, raw: &str) {
        self.replies.lock().push_back(Ok(raw.to_string()));
    }

    pub fn fail(&self, err: TransportError) {
        self.replies.lock().push_back(Err(err));
    }

    fn next(&self) -> Result<String, TransportError> {
        self.replies.lock().pop_front().unwrap_or(Err(TransportError::Closed))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(&self, payload: OutboundPayload) -> Result<String, TransportError> {
        self.sent.lock().push(payload);
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.next()
    }

    async fn fetch(&self, highest_fetched: SequenceNumber) -> Result<String, TransportError> {
        self.fetches.lock().push(highest_fetched);
        self.next()
    }
}

pub type TestSession = Session<BlockStore, Arc<ScriptedTransport>>;

pub fn id(s: &str) -> BlockId {
    BlockId::from(s)
}

pub fn payload(block: &str, text: &str) -> String {
    BlockSnapshot::text(id(block), text).to_payload().unwrap()
}

pub fn update(snum: SequenceNumber, block: &str, text: &str, base: u64) -> TransformDescriptor {
    TransformDescriptor {
        sdt_payload: Some(payload(block, text)),
        base_version: Some(base),
        ..TransformDescriptor::new(TransformKind::Update, snum)
    }
}

pub fn insert(snum: SequenceNumber, block: &str, text: &str) -> TransformDescriptor {
    TransformDescriptor {
        sdt_payload: Some(payload(block, text)),
        ..TransformDescriptor::new(TransformKind::Insert, snum)
    }
}

pub fn delete(snum: SequenceNumber, block: &str) -> TransformDescriptor {
    TransformDescriptor {
        idref: Some(id(block)),
        ..TransformDescriptor::new(TransformKind::Delete, snum)
    }
}

/// Session over `blocks`, baselined at `highest_seq` with every block at v1.
pub fn baselined(
    blocks: &[(&str, &str)],
    highest_seq: SequenceNumber,
) -> (TestSession, Arc<ScriptedTransport>) {
    let doc = BlockStore::from_blocks(blocks.iter().map(|(b, t)| BlockSnapshot::text(id(b), *t))).unwrap();
    let transport = ScriptedTransport::new();
    let mut session = Session::new(SharedDocument::new(doc), Arc::clone(&transport), SyncConfig::default());
    session
        .adopt_baseline(&ServerResponse {
            highest_seq,
            manifest: blocks.iter().map(|(b, _)| ManifestEntry::new(*b, 1)).collect(),
        })
        .unwrap();
    (session, transport)
}

/// Document order as plain strings.
pub fn order(session: &TestSession) -> Vec<String> {
    session
        .document()
        .read()
        .block_ids_ordered()
        .iter()
        .map(|b| b.to_string())
        .collect()
}

pub fn text(session: &TestSession, block: &str) -> Option<String> {
    session.document().read().text(&id(block)).map(str::to_string)
}

/// Document that cancels a round as soon as one chosen block is inserted,
/// so the batch stops part-way.
pub struct Tripwire {
    pub inner: BlockStore,
    pub trip_on: BlockId,
    pub token: CancellationToken,
}

impl DocumentModel for Tripwire {
    type Block = BlockSnapshot;

    fn block_ids(&self) -> Vec<BlockId> {
        self.inner.block_ids()
    }
    fn contains_block(&self, id: &BlockId) -> bool {
        self.inner.contains_block(id)
    }
    fn serialize_block(&self, id: &BlockId) -> ribsync_doc::Result<String> {
        self.inner.serialize_block(id)
    }
    fn deserialize_block(&self, payload: &str) -> ribsync_doc::Result<BlockSnapshot> {
        self.inner.deserialize_block(payload)
    }
    fn replace_block(&mut self, id: &BlockId, block: BlockSnapshot) -> ribsync_doc::Result<()> {
        self.inner.replace_block(id, block)
    }
    fn insert_block(&mut self, after: Option<&BlockId>, block: BlockSnapshot) -> ribsync_doc::Result<()> {
        let trip = block.id == self.trip_on;
        self.inner.insert_block(after, block)?;
        if trip {
            self.token.cancel();
        }
        Ok(())
    }
    fn delete_block(&mut self, id: &BlockId) -> ribsync_doc::Result<BlockSnapshot> {
        self.inner.delete_block(id)
    }
    fn block_span(&self, id: &BlockId) -> Option<Range<usize>> {
        self.inner.block_span(id)
    }
    fn apply_style(&mut self, target: Option<&BlockId>, style: &str) -> ribsync_doc::Result<Option<Range<usize>>> {
        self.inner.apply_style(target, style)
    }
    fn locally_changed_blocks(&self) -> Vec<BlockId> {
        self.inner.locally_changed_blocks()
    }
    fn clear_local_changes(&mut self) {
        self.inner.clear_local_changes()
    }
}

pub type TripwireSession = Session<Tripwire, Arc<ScriptedTransport>>;

/// Like [`baselined`], over a [`Tripwire`] that fires when `trip_on` is
/// inserted. Returns the token the wire cancels.
pub fn tripwired(
    blocks: &[(&str, &str)],
    highest_seq: SequenceNumber,
    trip_on: &str,
) -> (TripwireSession, Arc<ScriptedTransport>, CancellationToken) {
    let token = CancellationToken::new();
    let doc = Tripwire {
        inner: BlockStore::from_blocks(blocks.iter().map(|(b, t)| BlockSnapshot::text(id(b), *t))).unwrap(),
        trip_on: id(trip_on),
        token: token.clone(),
    };
    let transport = ScriptedTransport::new();
    let mut session = Session::new(SharedDocument::new(doc), Arc::clone(&transport), SyncConfig::default());
    session
        .adopt_baseline(&ServerResponse {
            highest_seq,
            manifest: blocks.iter().map(|(b, _)| ManifestEntry::new(*b, 1)).collect(),
        })
        .unwrap();
    (session, transport, token)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
