//! Periodic discovery of acoustic systems
//!
//! Every discovery period the console asks each relay which acoustic systems
//! it can reach. Replies are merged into the registry and listeners hear about
//! newly learned names.

use crate::dispatcher::Dispatcher;
use crate::registry::SystemRegistry;
use crate::resolver::{GatewayResolver, GatewaySelector};
use crate::wire::{AcousticFrame, DiscoveryReply};
use acomms_core::{DiscoveryConfig, GatewayConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Listener for newly learned system names
pub type SystemsChangedCallback = Arc<dyn Fn(&[String]) + Send + Sync + 'static>;

/// Sends systems queries and merges the replies
pub struct DiscoveryScheduler {
    registry: Arc<SystemRegistry>,
    resolver: GatewayResolver,
    dispatcher: Dispatcher,
    relay_service: String,
    period: Duration,
    enabled: bool,
    listeners: Mutex<Vec<SystemsChangedCallback>>,
}

impl DiscoveryScheduler {
    pub fn new(
        registry: Arc<SystemRegistry>,
        dispatcher: Dispatcher,
        gateway: &GatewayConfig,
        discovery: &DiscoveryConfig,
    ) -> Self {
        Self {
            resolver: GatewayResolver::new(registry.clone()),
            registry,
            dispatcher,
            relay_service: gateway.relay_service.clone(),
            period: discovery.period(),
            enabled: discovery.enabled,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_systems_changed<F>(&self, listener: F)
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Send one systems query to every relay, active or not.
    /// Returns how many relays accepted it.
    pub async fn query_once(&self) -> usize {
        let selector = GatewaySelector::AnyCapable(self.relay_service.clone());
        let relays = self.resolver.resolve(&selector, false);
        if relays.is_empty() {
            tracing::debug!(service = %self.relay_service, "no relay to query for systems");
            return 0;
        }

        let bytes = match AcousticFrame::SystemsQuery.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode systems query");
                return 0;
            }
        };
        let accepted = self.dispatcher.broadcast(&bytes, &relays).await;
        tracing::debug!(relays = relays.len(), accepted, "systems query sent");
        accepted
    }

    /// Operator-triggered refresh, outside the periodic schedule
    pub async fn refresh_now(&self) -> usize {
        tracing::info!("refreshing acoustic systems");
        self.query_once().await
    }

    /// Merge a systems reply into the registry.
    ///
    /// Returns the names that were new. Listeners are notified once per reply,
    /// and only when something was new.
    pub fn handle_reply(&self, reply: &DiscoveryReply) -> Vec<String> {
        let mut learned: Vec<String> = Vec::new();
        for name in reply.names() {
            if self.registry.observe(name, None, None) {
                learned.push(name.to_string());
            }
        }

        if !learned.is_empty() {
            tracing::info!(
                source = %reply.source,
                learned = ?learned,
                "new acoustic systems discovered"
            );
            let listeners: Vec<SystemsChangedCallback> = self.listeners.lock().clone();
            for listener in listeners {
                listener(&learned);
            }
        }
        learned
    }

    /// Query on every tick until `shutdown` fires.
    ///
    /// The first query goes out immediately. A slow query delays the next tick
    /// instead of overlapping it.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if !self.enabled {
            tracing::info!("acoustic discovery disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_secs = self.period.as_secs(), "acoustic discovery started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.query_once().await;
                }
            }
        }
        tracing::info!("acoustic discovery stopped");
    }
}

impl std::fmt::Debug for DiscoveryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryScheduler")
            .field("relay_service", &self.relay_service)
            .field("period", &self.period)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
