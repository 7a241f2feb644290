//! Gateway resolution
//!
//! Turns a gateway selector into the ordered set of relays an operation is
//! sent through. Ordering is by name so inter-gateway pacing is reproducible.

use crate::error::{RouterError, RouterResult};
use crate::registry::{RemoteSystem, SystemRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the gateways of an operation are chosen
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "name", rename_all = "snake_case")]
pub enum GatewaySelector {
    /// One named relay
    SpecificSystem(String),
    /// Every known system declaring the service
    AnyCapable(String),
}

impl GatewaySelector {
    pub fn specific(name: impl Into<String>) -> Self {
        GatewaySelector::SpecificSystem(name.into())
    }

    pub fn any(service: impl Into<String>) -> Self {
        GatewaySelector::AnyCapable(service.into())
    }
}

impl fmt::Display for GatewaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewaySelector::SpecificSystem(name) => write!(f, "gateway {name}"),
            GatewaySelector::AnyCapable(service) => write!(f, "any gateway providing {service}"),
        }
    }
}

/// Resolves selectors against the system registry
#[derive(Debug, Clone)]
pub struct GatewayResolver {
    registry: Arc<SystemRegistry>,
}

impl GatewayResolver {
    pub fn new(registry: Arc<SystemRegistry>) -> Self {
        Self { registry }
    }

    /// Candidate relays for `selector`, sorted by name.
    ///
    /// A specific system that is not in the registry yields an empty set. The
    /// `active_only` filter applies to `AnyCapable` only, since naming a relay
    /// explicitly overrides discovery.
    pub fn resolve(&self, selector: &GatewaySelector, active_only: bool) -> Vec<RemoteSystem> {
        match selector {
            GatewaySelector::SpecificSystem(name) => {
                self.registry.get(name).into_iter().collect()
            }
            GatewaySelector::AnyCapable(service) => self.registry.query(service, active_only),
        }
    }

    /// Like [`resolve`](Self::resolve), but an empty result is an explicit
    /// `NoGatewayAvailable` error.
    pub fn resolve_required(
        &self,
        selector: &GatewaySelector,
        active_only: bool,
    ) -> RouterResult<Vec<RemoteSystem>> {
        let gateways = self.resolve(selector, active_only);
        if gateways.is_empty() {
            tracing::warn!(selector = %selector, active_only, "no gateway resolved");
            return Err(RouterError::NoGatewayAvailable {
                selector: selector.to_string(),
            });
        }
        Ok(gateways)
    }
}
