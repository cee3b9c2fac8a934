use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::lane::LaneId;

/// Default number of samples kept, matching the 24-point traffic chart.
pub const DEFAULT_SERIES_CAPACITY: usize = 24;

/// Per-lane counts at the moment a count update was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSample {
    pub at: DateTime<Utc>,
    pub counts: BTreeMap<LaneId, u32>,
}

/// Rolling window of recent traffic samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSeries {
    samples: VecDeque<TrafficSample>,
    capacity: usize,
}

impl TrafficSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: TrafficSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn samples(&self) -> impl Iterator<Item = &TrafficSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&TrafficSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Count history for one lane, oldest first. Lanes absent from a sample read as 0.
    pub fn lane_history(&self, lane: LaneId) -> Vec<u32> {
        self.samples
            .iter()
            .map(|s| s.counts.get(&lane).copied().unwrap_or(0))
            .collect()
    }
}

impl Default for TrafficSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}
