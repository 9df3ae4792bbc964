//! Background sync worker.
//!
//! Owns a [`Session`] on a tokio task and processes commands one at a time, so
//! rounds for a document never overlap. The UI keeps a cloneable
//! [`SyncHandle`] and drains [`RoundEvent`]s from a bounded channel; nothing
//! on the worker touches UI state directly.
//!
//! ```text
//!   SyncHandle (Clone+Send)   mpsc      worker task
//!   ┌─────────────────────┐  ──────▶  ┌────────────────────────────┐
//!   │ .request_round()    │           │ Session<D, T>              │
//!   │ .resolve()          │  ◀──────  │ one command at a time      │
//!   │ .cancel_round()     │  oneshot  │                            │
//!   └─────────────────────┘           └──────────────┬─────────────┘
//!                                                    │ RoundEvent
//!                                                    ▼
//!                                              UI event loop
//! ```

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use ribsync_doc::DocumentModel;
use ribsync_types::BlockId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ResolveError, SyncError};
use crate::session::{Resolution, RoundReport, Session};
use crate::transport::Transport;

// ============================================================================
// Error Type
// ============================================================================

/// Errors talking to the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("sync worker shut down")]
    Shutdown,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

// ============================================================================
// Messages
// ============================================================================

/// Posted to the UI loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundEvent {
    /// A round finished or aborted.
    Complete(RoundReport),
    /// A review was resolved; re-render `dirty`.
    Resolved {
        id: BlockId,
        dirty: Option<Range<usize>>,
    },
}

enum WorkerCommand {
    RunRound {
        reply: Option<oneshot::Sender<RoundReport>>,
    },
    Resolve {
        id: BlockId,
        resolution: Resolution,
        reply: oneshot::Sender<Result<Option<Range<usize>>, ResolveError>>,
    },
    Shutdown,
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Cloneable handle to a running worker.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    /// Token for the round in flight (or the next one).
    round: Arc<Mutex<CancellationToken>>,
    shutdown: CancellationToken,
}

impl SyncHandle {
    /// Queue a round without waiting for it.
    pub fn request_round(&self) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerCommand::RunRound { reply: None })
            .map_err(|_| WorkerError::Shutdown)
    }

    /// Queue a round and wait for its report.
    pub async fn run_round(&self) -> Result<RoundReport, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::RunRound { reply: Some(reply) })
            .map_err(|_| WorkerError::Shutdown)?;
        rx.await.map_err(|_| WorkerError::Shutdown)
    }

    /// Cancel the round in flight, or the next one if the worker is idle.
    /// Takes effect before the write lock or between transforms.
    pub fn cancel_round(&self) {
        self.round.lock().cancel();
    }

    /// Accept or reject a pending review.
    pub async fn resolve(&self, id: BlockId, resolution: Resolution) -> Result<Option<Range<usize>>, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::Resolve { id, resolution, reply })
            .map_err(|_| WorkerError::Shutdown)?;
        Ok(rx.await.map_err(|_| WorkerError::Shutdown)??)
    }

    /// Stop the worker after the command in progress. Also cancels it.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.tx.send(WorkerCommand::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Worker
// ============================================================================

struct SyncWorker<D, T> {
    session: Session<D, T>,
    events: mpsc::Sender<RoundEvent>,
    round: Arc<Mutex<CancellationToken>>,
    shutdown: CancellationToken,
}

impl<D, T> SyncWorker<D, T>
where
    D: DocumentModel + Send + Sync + 'static,
    T: Transport + 'static,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WorkerCommand::RunRound { reply } => {
                    let report = self.round().await;
                    if let Some(reply) = reply {
                        let _ = reply.send(report.clone());
                    }
                    self.post(RoundEvent::Complete(report)).await;
                }
                WorkerCommand::Resolve { id, resolution, reply } => {
                    let result = self.session.resolve(&id, resolution);
                    if let Ok(dirty) = &result {
                        self.post(RoundEvent::Resolved {
                            id: id.clone(),
                            dirty: dirty.clone(),
                        })
                        .await;
                    }
                    let _ = reply.send(result);
                }
                WorkerCommand::Shutdown => break,
            }
            if self.shutdown.is_cancelled() {
                break;
            }
        }
        info!("sync worker for {} stopped", self.session.config().document_id);
    }

    async fn round(&mut self) -> RoundReport {
        let token = self.round.lock().clone();
        let result = self.session.run_round(&token).await;
        // Fresh token for the next round; a cancel never outlives its round.
        *self.round.lock() = self.shutdown.child_token();

        match result {
            Ok(report) => report,
            Err(e) => {
                match &e {
                    SyncError::Cancelled => debug!("round cancelled"),
                    other => warn!("round aborted: {}", other),
                }
                RoundReport::aborted(&e)
            }
        }
    }

    async fn post(&self, event: RoundEvent) {
        if self.events.send(event).await.is_err() {
            debug!("round event dropped: receiver closed");
        }
    }
}

/// Spawn a worker for `session` on the current tokio runtime.
///
/// Returns the handle and the receiving end of the round-event channel,
/// bounded by the session's `event_buffer`.
pub fn spawn_worker<D, T>(session: Session<D, T>) -> (SyncHandle, mpsc::Receiver<RoundEvent>)
where
    D: DocumentModel + Send + Sync + 'static,
    T: Transport + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (events, events_rx) = mpsc::channel(session.config().event_buffer.max(1));
    let shutdown = CancellationToken::new();
    let round = Arc::new(Mutex::new(shutdown.child_token()));

    let worker = SyncWorker {
        session,
        events,
        round: Arc::clone(&round),
        shutdown: shutdown.clone(),
    };
    tokio::spawn(worker.run(rx));

    (SyncHandle { tx, round, shutdown }, events_rx)
}
