//! Core types

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Geographic position of a remote system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Depth below surface in meters (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f32>,
}

impl Coordinate {
    /// Surface position without depth
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            depth: None,
        }
    }
}

/// Wall-clock timestamp in nanoseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
