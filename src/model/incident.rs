use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lane::LaneId;

/// Default number of incidents kept for the log view.
pub const DEFAULT_INCIDENT_CAPACITY: usize = 500;

/// A tamper or attack report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRecord {
    pub category: String,
    pub description: String,
    /// Local receive time, never the payload's own timestamp.
    pub timestamp: DateTime<Utc>,
    /// Lanes the incident was attributed to, in lane order.
    pub lanes: Vec<LaneId>,
}

/// Bounded, insertion-ordered incident history.
///
/// Oldest records are evicted once `capacity` is reached. Display code that
/// wants newest-first uses [`IncidentLog::recent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentLog {
    records: VecDeque<AttackRecord>,
    capacity: usize,
    /// Total ever recorded, including evicted ones.
    total_recorded: u64,
}

impl IncidentLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            total_recorded: 0,
        }
    }

    pub fn push(&mut self, record: AttackRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total_recorded += 1;
    }

    pub fn latest(&self) -> Option<&AttackRecord> {
        self.records.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AttackRecord> {
        self.records.iter()
    }

    /// Newest first.
    pub fn recent(&self) -> impl Iterator<Item = &AttackRecord> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Per-category tallies in first-seen order (feeds the security breakdown chart).
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for record in &self.records {
            match counts.iter_mut().find(|(name, _)| *name == record.category) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.category.clone(), 1)),
            }
        }
        counts
    }
}

impl Default for IncidentLog {
    fn default() -> Self {
        Self::new(DEFAULT_INCIDENT_CAPACITY)
    }
}
