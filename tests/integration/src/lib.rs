//! Integration tests for acoustic command routing
//!
//! This test suite validates, through the public console API:
//! - Fragmented messages fanned out over several gateways
//! - Notification correlation with and without request ids
//! - Discovery replies merged into the registry
//! - Timeout sweep, cancellation and shutdown
//! - Inter-gateway pacing of ranging requests on a paused clock

pub mod test_utils;

#[cfg(test)]
mod routing_scenarios;

#[cfg(test)]
mod lifecycle_tests;
