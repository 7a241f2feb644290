//! End-to-end routing scenarios
//!
//! Each test drives the console the way an operator session would: submit,
//! watch frames leave through the transport, then feed relay notifications
//! back in.

use crate::test_utils::{until_dispatched, Harness};
use acomms_c2_router::{
    fragment, reassemble, AcousticFrame, Correlation, DiscoveryReply, Dispatcher, Fragment,
    GatewayResolver, GatewaySelector, InboundMessage, Notification, OpCode, Operation,
    OperationId, OperationKind, OperationState, MAX_FRAGMENT_SIZE,
};
use acomms_core::RELAY_SERVICE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn message(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

/// Rebuild the fragments carried by operation frames
fn fragments_of(frames: &[AcousticFrame]) -> Vec<Fragment> {
    frames
        .iter()
        .map(|frame| match frame {
            AcousticFrame::Operation { fragment, data, .. } => {
                let tag = fragment.expect("fragmented frame");
                Fragment {
                    parent_operation_id: tag.operation,
                    sequence_index: tag.index,
                    sequence_count: tag.count,
                    bytes: data.clone(),
                }
            }
            other => panic!("unexpected frame {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn test_large_message_over_two_gateways() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);
    let payload = message(2500);

    let handle = harness
        .console
        .submit(
            OperationKind::SendMessage,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            payload.clone(),
        )
        .unwrap();
    until_dispatched(&handle).await;
    assert_eq!(handle.state(), OperationState::AwaitingReply);

    // Three fragments to each of the two gateways, all accepted.
    assert_eq!(harness.transport.accepted_count(), 6);
    for gateway in ["manta-1", "manta-2"] {
        let frames = harness.frames_to(gateway);
        let fragments = fragments_of(&frames);
        let sizes: Vec<usize> = fragments.iter().map(|f| f.bytes.len()).collect();
        assert_eq!(sizes, vec![1020, 1020, 460]);
        assert_eq!(reassemble(&fragments).unwrap(), payload);
    }

    let done = Notification::new(OpCode::Done, "lauv-1", "manta-2")
        .with_request_id(handle.request_id().unwrap());
    assert!(matches!(
        harness.console.handle_notification(&done),
        Correlation::Terminal(_)
    ));
    assert_eq!(handle.state(), OperationState::Succeeded);
}

#[tokio::test]
async fn test_dispatch_result_counts_every_send() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);
    let gateways = GatewayResolver::new(harness.console.registry().clone())
        .resolve_required(&GatewaySelector::any(RELAY_SERVICE), true)
        .unwrap();

    let payload = message(2500);
    let operation = Operation::new(
        OperationId(99),
        OperationKind::SendMessage,
        "lauv-1",
        GatewaySelector::any(RELAY_SERVICE),
        payload.clone(),
        0,
    );
    let units = fragment(operation.id, &payload, MAX_FRAGMENT_SIZE).unwrap();
    let dispatcher = Dispatcher::new(harness.transport.clone());
    let result = dispatcher
        .dispatch(
            &operation,
            &gateways,
            &units,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(units.len(), 3);
    assert_eq!(result.attempted, 6);
    assert_eq!(result.succeeded, 6);
    assert_eq!(result.fragments_delivered, 3);
}

#[tokio::test]
async fn test_busy_without_request_id_rejects_by_target() {
    let harness = Harness::new();
    harness.relay("manta-1", false);

    // Naming the relay bypasses the active-only filter.
    let handle = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::specific("manta-1"),
            Vec::new(),
        )
        .unwrap();
    until_dispatched(&handle).await;

    let busy = Notification::new(OpCode::Busy, "lauv-1", "manta-1");
    harness.console.handle_notification(&busy);

    let report = handle.report().unwrap();
    assert_eq!(report.state, OperationState::Rejected);
    assert!(report.reason.contains("busy"), "{}", report.reason);
    assert_eq!(harness.console.correlator().live_count(), 0);
    assert_eq!(harness.console.correlator().pending_count(), 0);
    // Hearing from the relay marks it reachable.
    assert!(harness.console.registry().get("manta-1").unwrap().is_active);
}

#[tokio::test]
async fn test_discovery_reply_with_duplicates() {
    let harness = Harness::new();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let seen = changes.clone();
    harness
        .console
        .on_known_systems_changed(move |names| seen.lock().unwrap().push(names.to_vec()));

    let before = harness.console.registry().len();
    let learned = harness
        .console
        .handle_discovery_reply(&DiscoveryReply::new("manta-1", "lauv-1,lauv-2,lauv-1"));

    assert_eq!(learned, vec!["lauv-1".to_string(), "lauv-2".to_string()]);
    assert_eq!(harness.console.registry().len(), before + 2);
    // An unregistered relay only enters the registry through presence.
    assert!(!harness.console.registry().contains("manta-1"));
    assert_eq!(changes.lock().unwrap().len(), 1);

    harness
        .console
        .handle_discovery_reply(&DiscoveryReply::new("manta-1", "lauv-2"));
    assert_eq!(changes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_fan_out_reply_leaves_next_operation_alone() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);

    let message = harness
        .console
        .submit(
            OperationKind::SendMessage,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            b"surface".to_vec(),
        )
        .unwrap();
    until_dispatched(&message).await;
    let request_id = message.request_id().unwrap();

    let first = Notification::new(OpCode::Done, "lauv-1", "manta-1").with_request_id(request_id);
    assert!(matches!(
        harness.console.handle_notification(&first),
        Correlation::Terminal(_)
    ));

    let abort = harness
        .console
        .submit(
            OperationKind::Abort,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    until_dispatched(&abort).await;

    // manta-2 relayed the same message and reports it done as well.
    let late = Notification::new(OpCode::Done, "lauv-1", "manta-2").with_request_id(request_id);
    assert_eq!(
        harness.console.handle_notification(&late),
        Correlation::Unrecognized
    );
    assert_eq!(abort.state(), OperationState::AwaitingReply);
    assert_eq!(harness.console.correlator().live_count(), 1);
}

#[tokio::test]
async fn test_terminal_listener_fires_once_per_operation() {
    let harness = Harness::new();
    harness.relay("manta-1", true);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    harness.console.on_operation_terminal(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = harness
        .console
        .submit(
            OperationKind::Abort,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    until_dispatched(&handle).await;

    let acked = Notification::new(OpCode::Acked, "lauv-1", "manta-1")
        .with_request_id(handle.request_id().unwrap());
    harness.console.handle_notification(&acked);
    assert_eq!(
        harness.console.handle_notification(&acked),
        Correlation::Unrecognized
    );
    harness
        .console
        .correlator()
        .sweep(Instant::now() + Duration::from_secs(3600));
    assert!(harness.console.cancel(handle.id()).is_none());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_progress_then_success_from_relay_json() {
    let harness = Harness::new();
    harness.relay("manta-1", true);
    let handle = harness
        .console
        .submit(
            OperationKind::SendMessage,
            "lauv-1",
            GatewaySelector::specific("manta-1"),
            b"surface".to_vec(),
        )
        .unwrap();
    until_dispatched(&handle).await;
    let request_id = handle.request_id().unwrap();

    let queued = format!(
        r#"{{"type":"notification","op_code":"MSG_QUEUED","subject":"lauv-1","source":"manta-1","request_id":{request_id}}}"#
    );
    harness
        .console
        .handle_inbound(InboundMessage::decode(queued.as_bytes()).unwrap());
    assert_eq!(handle.state(), OperationState::Queued);

    let done = format!(
        r#"{{"type":"notification","op_code":"MSG_DONE","subject":"lauv-1","source":"manta-1","request_id":{request_id}}}"#
    );
    harness
        .console
        .handle_inbound(InboundMessage::decode(done.as_bytes()).unwrap());
    assert_eq!(handle.state(), OperationState::Succeeded);
}

#[tokio::test]
async fn test_range_samples_reach_the_range_log() {
    let harness = Harness::new();
    let raw = br#"{"type":"presence","name":"manta-1","services":["acoustic/operation"],"location":{"lat":41.18,"lon":-8.70}}"#;
    harness
        .console
        .handle_inbound(InboundMessage::decode(raw).unwrap());

    let handle = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    until_dispatched(&handle).await;

    let sample = br#"{"type":"notification","op_code":"RANGE_RECVED","subject":"lauv-1","source":"manta-1","value":412.5}"#;
    harness
        .console
        .handle_inbound(InboundMessage::decode(sample).unwrap());

    let logged = harness.console.ranges().latest_for("lauv-1").unwrap();
    assert_eq!(logged.distance_m, 412.5);
    assert!(logged.source_location.is_some());
    // A range sample does not end the operation.
    assert_eq!(handle.state(), OperationState::AwaitingReply);
}
