//! Background worker: rounds, events, review resolution, shutdown.

mod common;

use std::time::Duration;

use common::*;
use ribsync_client::{spawn_worker, Resolution, RoundEvent, WorkerError, ResolveError};
use ribsync_types::{ManifestEntry, ServerResponse};

#[tokio::test]
async fn test_round_posts_completion_event() {
    init_tracing();
    let (session, transport) = baselined(&[("A", "one"), ("B", "two")], 10);
    transport.reply(&ServerResponse {
        highest_seq: 12,
        manifest: vec![
            ManifestEntry::new("A", 2).with_transform(update(11, "A", "uno", 1)),
            ManifestEntry::new("B", 2).deleted().with_transform(delete(12, "B")),
        ],
    });
    let document = session.document().clone();
    let (handle, mut events) = spawn_worker(session);

    let report = handle.run_round().await.unwrap();
    assert!(report.success);
    assert_eq!(report.applied, 2);
    match events.recv().await.unwrap() {
        RoundEvent::Complete(posted) => assert_eq!(posted, report),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(document.read().text(&id("A")), Some("uno"));

    // The delete left B awaiting review; accepting it drops the chunk
    let dirty = handle.resolve(id("B"), Resolution::Accept).await.unwrap();
    assert_eq!(dirty, None);
    assert!(matches!(
        events.recv().await.unwrap(),
        RoundEvent::Resolved { id: resolved, dirty: None } if resolved == id("B")
    ));
    assert!(matches!(
        handle.resolve(id("B"), Resolution::Accept).await,
        Err(WorkerError::Resolve(ResolveError::NotPending(_)))
    ));

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(handle.request_round(), Err(WorkerError::Shutdown)));
}

#[tokio::test]
async fn test_failed_round_reports_without_mutation() {
    let (session, _transport) = baselined(&[("A", "one")], 10);
    let document = session.document().clone();
    let (handle, mut events) = spawn_worker(session);

    // No scripted reply: the transport reports itself closed
    handle.request_round().unwrap();
    match events.recv().await.unwrap() {
        RoundEvent::Complete(report) => {
            assert!(!report.success);
            assert!(report.error.unwrap().contains("transport"));
            assert_eq!(report.dirty, None);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(document.read().full_text(), "one");
    handle.shutdown();
}

#[tokio::test]
async fn test_cancel_round_while_idle_cancels_next_round_only() {
    let (session, transport) = baselined(&[("A", "one")], 10);
    transport.reply(&ServerResponse {
        highest_seq: 10,
        manifest: vec![ManifestEntry::new("A", 1)],
    });
    let (handle, _events) = spawn_worker(session);

    handle.cancel_round();
    let cancelled = handle.run_round().await.unwrap();
    assert!(!cancelled.success);
    assert!(transport.sent.lock().is_empty());

    let next = handle.run_round().await.unwrap();
    assert!(next.success);
    assert_eq!(transport.sent.lock().len(), 1);
    handle.shutdown();
}
