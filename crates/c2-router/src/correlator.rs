//! Request correlation and operation lifecycle
//!
//! Every submitted operation is tracked here until it reaches a terminal
//! state. Operations that expect replies get a wire request id, indexed in the
//! pending-request table. Inbound notifications are matched back to their
//! operation by [`Correlator::lookup`]:
//!
//! 1. exact request id;
//! 2. for notifications without a request id, the most recent live operation
//!    whose target is the notification subject (relays that do not echo
//!    request ids).
//!
//! A request id that is no longer pending matches nothing. Fanned-out
//! operations get one reply per gateway, and only the first counts.
//!
//! A terminal transition removes the operation from the table and fires its
//! terminal callbacks exactly once.

use crate::command_types::{Operation, OperationId, OperationKind, OperationState, RequestId};
use crate::dispatcher::DispatchResult;
use crate::error::{RouterError, RouterResult};
use crate::wire::{Disposition, Notification, OpCode};
use acomms_core::now_ns;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Final outcome of an operation, delivered to terminal callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalReport {
    pub operation_id: OperationId,
    pub request_id: Option<RequestId>,
    pub kind: OperationKind,
    pub target: String,
    pub state: OperationState,
    /// Human-readable reason or result
    pub reason: String,
    pub finished_at_ns: u64,
}

/// Callback fired once when an operation terminates
pub type TerminalCallback = Box<dyn FnOnce(&TerminalReport) + Send + 'static>;

#[derive(Default)]
struct TerminalSlot {
    report: Option<TerminalReport>,
    callbacks: Vec<TerminalCallback>,
}

/// Caller's view of a submitted operation
#[derive(Clone)]
pub struct OperationHandle {
    id: OperationId,
    request_id: Option<RequestId>,
    kind: OperationKind,
    target: String,
    state: watch::Receiver<OperationState>,
    slot: Arc<Mutex<TerminalSlot>>,
}

impl OperationHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Latest known state
    pub fn state(&self) -> OperationState {
        match &self.slot.lock().report {
            Some(report) => report.state,
            None => *self.state.borrow(),
        }
    }

    /// Terminal report, once the operation has finished
    pub fn report(&self) -> Option<TerminalReport> {
        self.slot.lock().report.clone()
    }

    /// Register a callback for the terminal transition.
    ///
    /// Runs immediately if the operation already finished. Each callback runs
    /// at most once.
    pub fn on_terminal<F>(&self, callback: F)
    where
        F: FnOnce(&TerminalReport) + Send + 'static,
    {
        let mut slot = self.slot.lock();
        let finished = slot.report.clone();
        match finished {
            Some(report) => {
                drop(slot);
                callback(&report);
            }
            None => slot.callbacks.push(Box::new(callback)),
        }
    }

    /// Wait until the operation reaches a terminal state.
    pub async fn terminal(&self) -> Option<TerminalReport> {
        let mut state = self.state.clone();
        loop {
            if let Some(report) = self.report() {
                return Some(report);
            }
            if state.changed().await.is_err() {
                return self.report();
            }
        }
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Result of feeding one notification to the correlator
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// The operation terminated
    Terminal(TerminalReport),
    /// Non-terminal state change
    Progress {
        operation_id: OperationId,
        state: OperationState,
    },
    /// Range sample for a live operation
    RangeSample { operation_id: OperationId },
    /// No live operation matched; nothing changed
    Unrecognized,
}

struct Tracked {
    operation: Operation,
    started: Instant,
    /// Registration order, for "most recent" fallback matching
    seq: u64,
    cancel: CancellationToken,
    state_tx: watch::Sender<OperationState>,
    slot: Arc<Mutex<TerminalSlot>>,
}

impl Tracked {
    fn set_state(&mut self, state: OperationState, summary: Option<String>) {
        self.operation.state = state;
        self.operation.last_updated_ns = now_ns();
        if summary.is_some() {
            self.operation.result_summary = summary;
        }
        self.state_tx.send_replace(state);
    }
}

struct Table {
    operations: HashMap<OperationId, Tracked>,
    /// Pending-request table: wire request id to operation
    pending: HashMap<RequestId, OperationId>,
    next_request_id: RequestId,
    next_seq: u64,
}

impl Table {
    fn allocate_request_id(&mut self) -> Option<RequestId> {
        for _ in 0..=u16::MAX {
            let candidate = self.next_request_id;
            self.next_request_id = self.next_request_id.wrapping_add(1);
            if candidate != 0 && !self.pending.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn remove(&mut self, id: OperationId) -> Option<Tracked> {
        let tracked = self.operations.remove(&id)?;
        if let Some(request_id) = tracked.operation.request_id {
            self.pending.remove(&request_id);
        }
        Some(tracked)
    }
}

/// Tracks live operations and correlates relay notifications to them
pub struct Correlator {
    table: Mutex<Table>,
    operation_timeout: Duration,
}

impl Correlator {
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            table: Mutex::new(Table {
                operations: HashMap::new(),
                pending: HashMap::new(),
                next_request_id: 1,
                next_seq: 0,
            }),
            operation_timeout,
        }
    }

    /// Start tracking `operation`, assigning a request id when its kind
    /// expects replies. `cancel` aborts its dispatch.
    pub fn register(&self, mut operation: Operation, cancel: CancellationToken) -> OperationHandle {
        let (state_tx, state_rx) = watch::channel(operation.state);
        let slot = Arc::new(Mutex::new(TerminalSlot::default()));

        let mut table = self.table.lock();
        if operation.kind.expects_reply() {
            operation.request_id = table.allocate_request_id();
            match operation.request_id {
                Some(request_id) => {
                    table.pending.insert(request_id, operation.id);
                }
                None => tracing::warn!(
                    operation_id = %operation.id,
                    "request id space exhausted, operation will only match by target"
                ),
            }
        }
        let seq = table.next_seq;
        table.next_seq += 1;

        let handle = OperationHandle {
            id: operation.id,
            request_id: operation.request_id,
            kind: operation.kind,
            target: operation.target.clone(),
            state: state_rx,
            slot: slot.clone(),
        };
        tracing::debug!(
            operation_id = %operation.id,
            request_id = ?operation.request_id,
            kind = %operation.kind,
            target = %operation.target,
            "operation registered"
        );
        table.operations.insert(
            operation.id,
            Tracked {
                operation,
                started: Instant::now(),
                seq,
                cancel,
                state_tx,
                slot,
            },
        );
        handle
    }

    /// Dispatcher took over the operation
    pub fn mark_dispatching(&self, id: OperationId) {
        if let Some(tracked) = self.table.lock().operations.get_mut(&id) {
            if tracked.operation.state == OperationState::Created {
                tracked.set_state(OperationState::Dispatching, None);
            }
        }
    }

    /// Record the dispatch outcome.
    ///
    /// A failed dispatch terminates the operation as `Failed`. A successful
    /// one moves it to `AwaitingReply`, or terminates it as `Succeeded` when
    /// no reply is expected.
    pub fn dispatch_finished(
        &self,
        id: OperationId,
        outcome: &RouterResult<DispatchResult>,
    ) -> Option<TerminalReport> {
        let (state, reason) = match outcome {
            Err(e) => (OperationState::Failed, e.to_string()),
            Ok(result) => {
                let summary = format!(
                    "accepted for transmission by {} gateway(s)",
                    result.accepting_gateways().len()
                );
                let mut table = self.table.lock();
                let tracked = table.operations.get_mut(&id)?;
                if tracked.operation.request_id.is_some() || tracked.operation.kind.expects_reply() {
                    // A fast relay may already have reported progress.
                    if tracked.operation.state == OperationState::Dispatching {
                        tracked.set_state(OperationState::AwaitingReply, Some(summary));
                    }
                    return None;
                }
                (OperationState::Succeeded, summary)
            }
        };
        self.finish(id, state, reason)
    }

    /// Find the live operation a notification refers to.
    pub fn lookup(&self, notification: &Notification) -> Option<OperationId> {
        let table = self.table.lock();
        Self::lookup_in(&table, notification)
    }

    fn lookup_in(table: &Table, notification: &Notification) -> Option<OperationId> {
        if let Some(request_id) = notification.request_id {
            return table.pending.get(&request_id).copied();
        }
        table
            .operations
            .values()
            .filter(|t| t.operation.target == notification.subject)
            .max_by_key(|t| t.seq)
            .map(|t| t.operation.id)
    }

    /// Apply a notification to the operation it refers to
    pub fn on_notification(&self, notification: &Notification) -> Correlation {
        let description = notification.describe();
        let id = {
            let mut table = self.table.lock();
            let Some(id) = Self::lookup_in(&table, notification) else {
                tracing::info!(
                    op_code = %notification.op_code,
                    subject = %notification.subject,
                    source = %notification.source,
                    request_id = ?notification.request_id,
                    "{}",
                    RouterError::UnrecognizedNotification {
                        op_code: notification.op_code.to_string(),
                        subject: notification.subject.clone(),
                    }
                );
                return Correlation::Unrecognized;
            };

            match notification.op_code.disposition() {
                Disposition::Terminal(_) => id,
                Disposition::Progress(state) => {
                    if let Some(tracked) = table.operations.get_mut(&id) {
                        tracked.set_state(state, Some(description));
                    }
                    tracing::debug!(operation_id = %id, state = %state, "operation progress");
                    return Correlation::Progress {
                        operation_id: id,
                        state,
                    };
                }
                Disposition::RangeSample => {
                    if let Some(tracked) = table.operations.get_mut(&id) {
                        tracked.operation.last_updated_ns = now_ns();
                        tracked.operation.result_summary = Some(description);
                    }
                    return Correlation::RangeSample { operation_id: id };
                }
            }
        };

        let (state, reason) = terminal_reason(notification);
        match self.finish(id, state, reason) {
            Some(report) => Correlation::Terminal(report),
            None => Correlation::Unrecognized,
        }
    }

    /// Time out every live operation older than the configured age.
    pub fn sweep(&self, now: Instant) -> Vec<TerminalReport> {
        let expired: Vec<OperationId> = self
            .table
            .lock()
            .operations
            .values()
            .filter(|t| now.saturating_duration_since(t.started) >= self.operation_timeout)
            .map(|t| t.operation.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                let reason = RouterError::RemoteTimeout(format!(
                    "no terminal reply within {}s",
                    self.operation_timeout.as_secs()
                ))
                .to_string();
                self.finish(id, OperationState::TimedOut, reason)
            })
            .collect()
    }

    /// Cancel a live operation. Its dispatch stops at the next pacing wait.
    pub fn cancel(&self, id: OperationId) -> Option<TerminalReport> {
        self.finish(id, OperationState::Failed, RouterError::Cancelled.to_string())
    }

    /// Fail every live operation, used on shutdown.
    pub fn fail_all(&self, reason: &str) -> usize {
        let ids: Vec<OperationId> = self.table.lock().operations.keys().copied().collect();
        let count = ids
            .into_iter()
            .filter(|id| self.finish(*id, OperationState::Failed, reason.to_string()).is_some())
            .count();
        if count > 0 {
            tracing::warn!(failed_operations = count, reason, "failed live operations");
        }
        count
    }

    fn finish(
        &self,
        id: OperationId,
        state: OperationState,
        reason: String,
    ) -> Option<TerminalReport> {
        let mut tracked = self.table.lock().remove(id)?;
        tracked.set_state(state, Some(reason.clone()));
        // Stops a dispatch still pacing between gateways.
        tracked.cancel.cancel();

        let report = TerminalReport {
            operation_id: id,
            request_id: tracked.operation.request_id,
            kind: tracked.operation.kind,
            target: tracked.operation.target.clone(),
            state,
            reason,
            finished_at_ns: tracked.operation.last_updated_ns,
        };

        let callbacks = {
            let mut slot = tracked.slot.lock();
            slot.report = Some(report.clone());
            std::mem::take(&mut slot.callbacks)
        };
        // Closing the state channel wakes waiters in `OperationHandle::terminal`.
        drop(tracked);

        match state {
            OperationState::Succeeded => tracing::info!(
                operation_id = %id,
                kind = %report.kind,
                target = %report.target,
                "operation succeeded: {}",
                report.reason
            ),
            _ => tracing::warn!(
                operation_id = %id,
                kind = %report.kind,
                target = %report.target,
                state = %state,
                "operation ended: {}",
                report.reason
            ),
        }

        for callback in callbacks {
            callback(&report);
        }
        Some(report)
    }

    /// Snapshot of a live operation
    pub fn get(&self, id: OperationId) -> Option<Operation> {
        self.table
            .lock()
            .operations
            .get(&id)
            .map(|t| t.operation.clone())
    }

    /// Snapshots of all live operations, oldest first
    pub fn live_operations(&self) -> Vec<Operation> {
        let table = self.table.lock();
        let mut live: Vec<&Tracked> = table.operations.values().collect();
        live.sort_by_key(|t| t.seq);
        live.into_iter().map(|t| t.operation.clone()).collect()
    }

    /// Entries in the pending-request table
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.table.lock().pending.contains_key(&request_id)
    }

    /// Operations not yet terminal
    pub fn live_count(&self) -> usize {
        self.table.lock().operations.len()
    }
}

fn terminal_reason(notification: &Notification) -> (OperationState, String) {
    let source = notification.source.clone();
    match notification.op_code {
        OpCode::Acked | OpCode::Done => (OperationState::Succeeded, notification.describe()),
        OpCode::Busy | OpCode::NoTxd | OpCode::Unsupported => {
            let reason = match notification.op_code {
                OpCode::Busy => "busy",
                OpCode::NoTxd => "no acoustic transducer connected",
                _ => "unsupported",
            };
            (
                OperationState::Rejected,
                RouterError::RemoteRejected {
                    source_relay: source,
                    reason: reason.to_string(),
                }
                .to_string(),
            )
        }
        OpCode::Timeout => (
            OperationState::TimedOut,
            RouterError::RemoteTimeout(notification.describe()).to_string(),
        ),
        _ => (
            OperationState::Failed,
            RouterError::RemoteFailure(notification.describe()).to_string(),
        ),
    }
}
