//! Acoustic operations console
//!
//! [`AcousticConsole`] ties the routing pieces together. A submit resolves
//! gateways and fragments the payload synchronously, registers the operation
//! with the correlator and dispatches it on its own task. Inbound relay traffic
//! is fed back through the `handle_*` methods.
//!
//! ```no_run
//! use acomms_c2_router::{AcousticConsole, OperationKind, RecordingTransport, GatewaySelector};
//! use acomms_core::ConsoleConfig;
//! use std::sync::Arc;
//!
//! # async fn demo() -> acomms_c2_router::RouterResult<()> {
//! let console = AcousticConsole::new(&ConsoleConfig::default(), Arc::new(RecordingTransport::new()));
//! console.start();
//! let handle = console.submit(
//!     OperationKind::Range,
//!     "lauv-1",
//!     GatewaySelector::specific("manta-1"),
//!     Vec::new(),
//! )?;
//! let report = handle.terminal().await;
//! console.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::command_types::{CommandPayload, Operation, OperationId, OperationKind};
use crate::correlator::{Correlation, Correlator, OperationHandle, TerminalReport};
use crate::discovery::DiscoveryScheduler;
use crate::dispatcher::Dispatcher;
use crate::error::RouterResult;
use crate::fragmenter::fragment;
use crate::ranges::{RangeLog, RangeSample};
use crate::registry::{RemoteSystem, SystemRegistry};
use crate::resolver::{GatewayResolver, GatewaySelector};
use crate::session::OperationSession;
use crate::transport::AcousticTransport;
use crate::wire::{DiscoveryReply, InboundMessage, Notification, OpCode};
use acomms_core::{now_ns, ConsoleConfig, Coordinate, GatewayConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type TerminalListener = Arc<dyn Fn(&TerminalReport) + Send + Sync + 'static>;

/// Command console for vehicles reachable only through acoustic relays
pub struct AcousticConsole {
    name: String,
    gateway: GatewayConfig,
    sweep_interval: Duration,
    registry: Arc<SystemRegistry>,
    resolver: GatewayResolver,
    dispatcher: Dispatcher,
    correlator: Arc<Correlator>,
    discovery: Arc<DiscoveryScheduler>,
    ranges: RangeLog,
    next_operation_id: AtomicU64,
    terminal_listeners: Arc<Mutex<Vec<TerminalListener>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AcousticConsole {
    /// Build a console from `config`, sending through `transport`.
    ///
    /// The registry starts with the configured seed systems.
    pub fn new(config: &ConsoleConfig, transport: Arc<dyn AcousticTransport>) -> Self {
        let registry = Arc::new(SystemRegistry::with_seed(&config.discovery.seed_systems));
        let dispatcher = Dispatcher::new(transport);
        let discovery = Arc::new(DiscoveryScheduler::new(
            registry.clone(),
            dispatcher.clone(),
            &config.gateway,
            &config.discovery,
        ));

        Self {
            name: config.network.console_name.clone(),
            gateway: config.gateway.clone(),
            sweep_interval: config.correlator.sweep_interval(),
            resolver: GatewayResolver::new(registry.clone()),
            registry,
            dispatcher,
            correlator: Arc::new(Correlator::new(config.correlator.operation_timeout())),
            discovery,
            ranges: RangeLog::with_capacity(config.ranges.capacity),
            next_operation_id: AtomicU64::new(1),
            terminal_listeners: Arc::new(Mutex::new(Vec::new())),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default session for `target` under the configured gateway policy
    pub fn session(&self, target: impl Into<String>) -> OperationSession {
        OperationSession::new(target, &self.gateway)
    }

    /// Submit an operation through `selector` with the configured policy.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        kind: OperationKind,
        target: &str,
        selector: GatewaySelector,
        payload: Vec<u8>,
    ) -> RouterResult<OperationHandle> {
        let session = self.session(target).via(selector);
        self.submit_session(&session, kind, payload)
    }

    /// Encode `command` and submit it under `session`
    pub fn submit_command(
        &self,
        session: &OperationSession,
        command: &CommandPayload,
    ) -> RouterResult<OperationHandle> {
        self.submit_session(session, command.kind(), command.encode()?)
    }

    /// Submit an operation under `session`.
    ///
    /// Fails synchronously when no gateway resolves or the payload cannot be
    /// fragmented. Everything after that, including transport refusals, is
    /// reported through the returned handle.
    pub fn submit_session(
        &self,
        session: &OperationSession,
        kind: OperationKind,
        payload: Vec<u8>,
    ) -> RouterResult<OperationHandle> {
        let gateways = self
            .resolver
            .resolve_required(&session.selector, session.active_only)?;

        let id = OperationId(self.next_operation_id.fetch_add(1, Ordering::Relaxed));
        let units = fragment(id, &payload, self.gateway.max_fragment_size)?;
        let mut operation = Operation::new(
            id,
            kind,
            session.target.clone(),
            session.selector.clone(),
            payload,
            now_ns(),
        );

        let cancel = self.shutdown.child_token();
        let handle = self.correlator.register(operation.clone(), cancel.clone());
        operation.request_id = handle.request_id();

        let listeners = self.terminal_listeners.clone();
        handle.on_terminal(move |report| {
            let listeners: Vec<TerminalListener> = listeners.lock().clone();
            for listener in listeners {
                listener(report);
            }
        });

        tracing::info!(
            operation_id = %id,
            request_id = ?operation.request_id,
            kind = %kind,
            target = %session.target,
            gateways = gateways.len(),
            fragments = units.len(),
            "submitting acoustic operation"
        );

        let pacing = session.pacing_for(kind);
        let dispatcher = self.dispatcher.clone();
        let correlator = self.correlator.clone();
        tokio::spawn(async move {
            correlator.mark_dispatching(operation.id);
            let outcome = dispatcher
                .dispatch(&operation, &gateways, &units, pacing, &cancel)
                .await;
            correlator.dispatch_finished(operation.id, &outcome);
        });

        Ok(handle)
    }

    /// Listen for every operation reaching a terminal state
    pub fn on_operation_terminal<F>(&self, listener: F)
    where
        F: Fn(&TerminalReport) + Send + Sync + 'static,
    {
        self.terminal_listeners.lock().push(Arc::new(listener));
    }

    /// Listen for newly discovered system names
    pub fn on_known_systems_changed<F>(&self, listener: F)
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.discovery.on_systems_changed(listener);
    }

    /// Apply a relay notification.
    ///
    /// Range samples are logged whether or not they match an operation.
    pub fn handle_notification(&self, notification: &Notification) -> Correlation {
        self.registry.mark_active(&notification.source);

        if notification.op_code == OpCode::RangeReceived {
            if let Some(distance_m) = notification.value {
                self.ranges.record(RangeSample {
                    target: notification.subject.clone(),
                    source_relay: notification.source.clone(),
                    source_location: self.registry.location_of(&notification.source),
                    distance_m,
                    received_at_ns: now_ns(),
                });
            }
        }

        self.correlator.on_notification(notification)
    }

    /// Merge a systems reply; returns the newly learned names
    pub fn handle_discovery_reply(&self, reply: &DiscoveryReply) -> Vec<String> {
        self.registry.mark_active(&reply.source);
        self.discovery.handle_reply(reply)
    }

    /// A system announced itself with its services and position
    pub fn handle_presence(&self, name: &str, services: &[String], location: Option<Coordinate>) {
        self.registry.observe(name, Some(services), location);
        self.registry.mark_active(name);
    }

    pub fn handle_link_lost(&self, name: &str) {
        self.registry.mark_inactive(name);
    }

    /// Route any inbound message to its handler
    pub fn handle_inbound(&self, message: InboundMessage) {
        match message {
            InboundMessage::Notification(notification) => {
                self.handle_notification(&notification);
            }
            InboundMessage::Systems(reply) => {
                self.handle_discovery_reply(&reply);
            }
            InboundMessage::Presence {
                name,
                services,
                location,
            } => self.handle_presence(&name, &services, location),
            InboundMessage::LinkLost { name } => self.handle_link_lost(&name),
        }
    }

    /// Cancel a live operation
    pub fn cancel(&self, id: OperationId) -> Option<TerminalReport> {
        self.correlator.cancel(id)
    }

    /// Query relays for systems now
    pub async fn refresh_systems(&self) -> usize {
        self.discovery.refresh_now().await
    }

    /// Spawn the timeout sweep and periodic discovery.
    ///
    /// Must be called from within a Tokio runtime. Calling it again after
    /// [`shutdown`](Self::shutdown) does nothing.
    pub fn start(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let correlator = self.correlator.clone();
        let shutdown = self.shutdown.clone();
        let period = self.sweep_interval;
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = correlator.sweep(tokio::time::Instant::now());
                        if !expired.is_empty() {
                            tracing::info!(expired = expired.len(), "timed out stale operations");
                        }
                    }
                }
            }
        });

        let discovery = tokio::spawn(self.discovery.clone().run(self.shutdown.clone()));

        let mut tasks = self.tasks.lock();
        tasks.push(sweep);
        tasks.push(discovery);
        tracing::info!(console = %self.name, "acoustic console started");
    }

    /// Stop background work, cancel in-flight dispatches and fail whatever is
    /// still live.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        self.correlator.fail_all("console shutting down");
        tracing::info!(console = %self.name, "acoustic console stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn registry(&self) -> &Arc<SystemRegistry> {
        &self.registry
    }

    pub fn known_systems(&self) -> Vec<RemoteSystem> {
        self.registry.list()
    }

    pub fn ranges(&self) -> &RangeLog {
        &self.ranges
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn live_operations(&self) -> Vec<Operation> {
        self.correlator.live_operations()
    }
}

impl std::fmt::Debug for AcousticConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcousticConsole")
            .field("name", &self.name)
            .field("known_systems", &self.registry.len())
            .field("live_operations", &self.correlator.live_count())
            .finish_non_exhaustive()
    }
}
