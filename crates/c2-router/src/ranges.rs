//! Log of acoustic range measurements, consumed by position estimation.

use acomms_core::{Coordinate, DEFAULT_RANGE_CAPACITY};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Distance from a relay to a target at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSample {
    pub target: String,
    pub source_relay: String,
    /// Relay position when the range was taken, if known
    pub source_location: Option<Coordinate>,
    pub distance_m: f64,
    pub received_at_ns: u64,
}

/// Bounded log of range samples; the oldest sample is dropped when full.
#[derive(Debug)]
pub struct RangeLog {
    samples: Mutex<VecDeque<RangeSample>>,
    capacity: usize,
}

impl Default for RangeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RANGE_CAPACITY)
    }
}

impl RangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding at most `capacity` samples (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RANGE_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, sample: RangeSample) {
        tracing::info!(
            target_system = %sample.target,
            source = %sample.source_relay,
            distance_m = sample.distance_m,
            "range received"
        );
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// All samples, oldest first
    pub fn samples(&self) -> Vec<RangeSample> {
        self.samples.lock().iter().cloned().collect()
    }

    pub fn latest_for(&self, target: &str) -> Option<RangeSample> {
        self.samples
            .lock()
            .iter()
            .rev()
            .find(|s| s.target == target)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}
