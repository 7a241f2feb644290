//! Operation dispatcher with gateway fan-out
//!
//! Sends every unit of an operation to every resolved gateway and aggregates
//! the per-gateway outcomes. Sends are best effort: a refused send is recorded
//! and the fan-out continues. Gateways share one acoustic medium, so for kinds
//! that need it the dispatcher waits between sends to different gateways.

#![warn(missing_docs)]

use crate::command_types::{Operation, OperationId};
use crate::error::{RouterError, RouterResult};
use crate::fragmenter::Fragment;
use crate::registry::RemoteSystem;
use crate::transport::AcousticTransport;
use crate::wire::AcousticFrame;
use acomms_core::now_ns;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of one send to one gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOutcome {
    /// Gateway name
    pub gateway: String,
    /// Index of the unit that was sent
    pub fragment_index: usize,
    /// Whether the transport accepted the bytes
    pub accepted: bool,
    /// Send timestamp (ns)
    pub timestamp_ns: u64,
}

/// Aggregated result of dispatching one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Operation dispatched
    pub operation_id: OperationId,
    /// Sends attempted
    pub attempted: usize,
    /// Sends accepted by the transport
    pub succeeded: usize,
    /// Units in the message
    pub fragments_total: usize,
    /// Units accepted by at least one gateway
    pub fragments_delivered: usize,
    /// Every send, in order
    pub per_gateway: Vec<GatewayOutcome>,
    /// Wall time spent, pacing included
    pub elapsed: Duration,
}

impl DispatchResult {
    fn new(operation_id: OperationId, fragments_total: usize) -> Self {
        Self {
            operation_id,
            attempted: 0,
            succeeded: 0,
            fragments_total,
            fragments_delivered: 0,
            per_gateway: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Every unit reached at least one gateway
    pub fn delivered(&self) -> bool {
        self.fragments_total > 0 && self.fragments_delivered == self.fragments_total
    }

    /// Distinct gateways that accepted at least one unit
    pub fn accepting_gateways(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .per_gateway
            .iter()
            .filter(|o| o.accepted)
            .map(|o| o.gateway.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Classify the aggregate: all delivered, nothing accepted, or partial
    pub fn into_result(self) -> RouterResult<Self> {
        if self.delivered() {
            Ok(self)
        } else if self.succeeded == 0 {
            Err(RouterError::TransportRejected {
                attempted: self.attempted,
            })
        } else {
            Err(RouterError::PartialFragmentFailure {
                delivered: self.fragments_delivered,
                total: self.fragments_total,
            })
        }
    }
}

/// Sends operation units to gateways through the transport
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn AcousticTransport>,
}

impl Dispatcher {
    /// Create a dispatcher over `transport`
    pub fn new(transport: Arc<dyn AcousticTransport>) -> Self {
        Self { transport }
    }

    /// Send each unit to each gateway, fragment by fragment.
    ///
    /// With `pacing` set and more than one gateway, waits that long between
    /// consecutive sends to different gateways. The wait ends early with
    /// `Cancelled` when `cancel` fires.
    ///
    /// Within a unit, success is OR over gateways; the message is delivered
    /// only if every unit succeeded somewhere.
    pub async fn dispatch(
        &self,
        operation: &Operation,
        gateways: &[RemoteSystem],
        fragments: &[Fragment],
        pacing: Option<Duration>,
        cancel: &CancellationToken,
    ) -> RouterResult<DispatchResult> {
        if gateways.is_empty() {
            return Err(RouterError::NoGatewayAvailable {
                selector: operation.selector.to_string(),
            });
        }

        let started = tokio::time::Instant::now();
        let pacing = pacing.filter(|_| gateways.len() > 1);
        let mut result = DispatchResult::new(operation.id, fragments.len());
        let mut last_gateway: Option<&str> = None;

        for unit in fragments {
            let bytes = AcousticFrame::for_unit(operation, unit).encode()?;
            let mut unit_delivered = false;

            for gateway in gateways {
                let name = gateway.name.as_str();
                if cancel.is_cancelled() {
                    return Err(RouterError::Cancelled);
                }
                if let (Some(gap), Some(previous)) = (pacing, last_gateway) {
                    if previous != name {
                        tokio::select! {
                            _ = tokio::time::sleep(gap) => {}
                            _ = cancel.cancelled() => {
                                tracing::info!(operation_id = %operation.id, "dispatch cancelled during pacing");
                                return Err(RouterError::Cancelled);
                            }
                        }
                    }
                }

                let accepted = self.transport.send_raw(&bytes, name).await;
                last_gateway = Some(name);
                result.attempted += 1;
                if accepted {
                    result.succeeded += 1;
                    unit_delivered = true;
                } else {
                    tracing::warn!(
                        operation_id = %operation.id,
                        gateway = %name,
                        fragment = unit.sequence_index,
                        "transport refused send"
                    );
                }
                result.per_gateway.push(GatewayOutcome {
                    gateway: name.to_string(),
                    fragment_index: unit.sequence_index,
                    accepted,
                    timestamp_ns: now_ns(),
                });
            }

            if unit_delivered {
                result.fragments_delivered += 1;
            }
        }

        result.elapsed = started.elapsed();
        if fragments.len() > 1 {
            tracing::info!(
                operation_id = %operation.id,
                fragments = fragments.len(),
                delivered = result.fragments_delivered,
                "multi-fragment message dispatched"
            );
        }
        tracing::debug!(
            operation_id = %operation.id,
            kind = %operation.kind,
            attempted = result.attempted,
            succeeded = result.succeeded,
            "dispatch finished"
        );
        result.into_result()
    }

    /// Send the same stateless frame to each gateway, unpaced.
    /// Returns how many gateways accepted it.
    pub async fn broadcast(&self, bytes: &[u8], gateways: &[RemoteSystem]) -> usize {
        let mut accepted = 0;
        for gateway in gateways {
            if self.transport.send_raw(bytes, &gateway.name).await {
                accepted += 1;
            } else {
                tracing::warn!(gateway = %gateway.name, "transport refused broadcast frame");
            }
        }
        accepted
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
