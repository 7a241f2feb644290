//! Per-target operator session
//!
//! Holds what the operator picked for the current target (gateway choice and
//! pacing policy) as a plain value handed to the console on every submit.

use crate::command_types::OperationKind;
use crate::resolver::GatewaySelector;
use acomms_core::GatewayConfig;
use std::time::Duration;

/// Operator choices applied to the operations of one target
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSession {
    pub target: String,
    pub selector: GatewaySelector,
    /// Resolve only gateways currently marked active
    pub active_only: bool,
    /// Space sends to different gateways for kinds that need it
    pub separate_ranging: bool,
    pub inter_send_delay: Duration,
}

impl OperationSession {
    /// Session for `target` through any relay, with the configured policy
    pub fn new(target: impl Into<String>, config: &GatewayConfig) -> Self {
        Self {
            target: target.into(),
            selector: GatewaySelector::AnyCapable(config.relay_service.clone()),
            active_only: config.active_only,
            separate_ranging: config.separate_ranging,
            inter_send_delay: config.inter_send_delay(),
        }
    }

    pub fn via(mut self, selector: GatewaySelector) -> Self {
        self.selector = selector;
        self
    }

    /// Pacing applied when dispatching `kind`, if any
    pub fn pacing_for(&self, kind: OperationKind) -> Option<Duration> {
        (self.separate_ranging && kind.separates_gateways() && !self.inter_send_delay.is_zero())
            .then_some(self.inter_send_delay)
    }
}
