//! Operation lifecycle tests on a paused clock
//!
//! Timeouts, pacing and cancellation all hinge on elapsed time, so these
//! tests run with `start_paused` and let Tokio auto-advance.

use crate::test_utils::{test_config, until_dispatched, Harness};
use acomms_c2_router::{
    GatewaySelector, Notification, OpCode, OperationKind, OperationState, RouterError,
};
use acomms_core::RELAY_SERVICE;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_sweep_times_out_silent_operations() {
    let harness = Harness::new();
    harness.relay("manta-1", true);
    harness.console.start();

    let handle = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::specific("manta-1"),
            Vec::new(),
        )
        .unwrap();

    // Timeout is 30 s, checked every 5 s.
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(handle.state(), OperationState::AwaitingReply);

    let report = handle.terminal().await.unwrap();
    assert_eq!(report.state, OperationState::TimedOut);
    assert_eq!(harness.console.correlator().pending_count(), 0);

    harness.console.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ranging_is_paced_across_three_gateways() {
    let harness = Harness::new();
    harness
        .relay("manta-1", true)
        .relay("manta-2", true)
        .relay("manta-3", true);

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

    let sent = harness.transport.sent();
    let order: Vec<&str> = sent.iter().map(|f| f.gateway.as_str()).collect();
    assert_eq!(order, vec!["manta-1", "manta-2", "manta-3"]);

    let span = sent[2].at.duration_since(sent[0].at);
    assert!(span >= Duration::from_secs(4), "span {span:?}");
    for pair in sent.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_secs(2) && gap < Duration::from_millis(2010), "gap {gap:?}");
    }
    assert_eq!(handle.state(), OperationState::AwaitingReply);
}

#[tokio::test(start_paused = true)]
async fn test_messages_are_not_paced() {
    let harness = Harness::new();
    harness
        .relay("manta-1", true)
        .relay("manta-2", true)
        .relay("manta-3", true);

    let handle = harness
        .console
        .submit(
            OperationKind::SendMessage,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            b"hello".to_vec(),
        )
        .unwrap();
    until_dispatched(&handle).await;

    let sent = harness.transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[2].at.duration_since(sent[0].at) < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_pacing_disabled_by_config() {
    let mut config = test_config();
    config.gateway.separate_ranging = false;
    let harness = Harness::with_config(config);
    harness.relay("manta-1", true).relay("manta-2", true);

    let handle = harness
        .console
        .submit(
            OperationKind::ReverseRange,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    let report = handle.terminal().await.unwrap();

    assert_eq!(report.state, OperationState::Succeeded);
    let sent = harness.transport.sent();
    assert!(sent[1].at.duration_since(sent[0].at) < Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_pacing() {
    let harness = Harness::new();
    harness
        .relay("manta-1", true)
        .relay("manta-2", true)
        .relay("manta-3", true);

    let handle = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();

    // First send goes out immediately, the second waits 2 s.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let report = harness.console.cancel(handle.id()).unwrap();
    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.reason, RouterError::Cancelled.to_string());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_stops_remaining_gateways() {
    let harness = Harness::new();
    harness
        .relay("manta-1", true)
        .relay("manta-2", true)
        .relay("manta-3", true);

    let handle = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let busy = Notification::new(OpCode::Busy, "lauv-1", "manta-1")
        .with_request_id(handle.request_id().unwrap());
    harness.console.handle_notification(&busy);
    assert_eq!(handle.state(), OperationState::Rejected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_refused_everywhere_fails() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);
    harness.transport.reject_gateway("manta-1");
    harness.transport.reject_gateway("manta-2");

    let handle = harness
        .console
        .submit(
            OperationKind::Abort,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    let report = handle.terminal().await.unwrap();

    assert_eq!(report.state, OperationState::Failed);
    assert!(report.reason.contains("Transport rejected"), "{}", report.reason);
    assert_eq!(harness.console.correlator().live_count(), 0);
}

#[tokio::test]
async fn test_one_refusing_gateway_does_not_fail_the_operation() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);
    harness.transport.reject_gateway("manta-1");

    let handle = harness
        .console
        .submit(
            OperationKind::SendMessage,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            vec![7u8; 3000],
        )
        .unwrap();
    until_dispatched(&handle).await;

    assert_eq!(handle.state(), OperationState::AwaitingReply);
    assert_eq!(harness.transport.sent_to("manta-1").len(), 3);
    assert_eq!(harness.transport.accepted_count(), 3);
}

#[tokio::test]
async fn test_inactive_relays_are_skipped() {
    let harness = Harness::new();
    harness.relay("manta-1", false).relay("manta-2", true);

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

    assert!(harness.transport.sent_to("manta-1").is_empty());
    assert_eq!(harness.transport.sent_to("manta-2").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_pending_work() {
    let harness = Harness::new();
    harness.relay("manta-1", true).relay("manta-2", true);
    harness.console.start();

    let ranging = harness
        .console
        .submit(
            OperationKind::Range,
            "lauv-1",
            GatewaySelector::any(RELAY_SERVICE),
            Vec::new(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.console.shutdown().await;
    let report = ranging.terminal().await.unwrap();
    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(harness.console.correlator().live_count(), 0);

    // Nothing new is sent once the console has stopped.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.sent().len(), 1);
}
