//! The complete dashboard state at one point in time.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::incident::{AttackRecord, IncidentLog};
use super::lane::{LaneId, LaneState, LightMode};
use super::series::TrafficSeries;
use crate::network::ConnectionStatus;

/// Immutable dashboard state.
///
/// Snapshots are shared as `Arc<DashboardSnapshot>` and never modified after
/// publication; each update builds a successor with a higher `revision`.
/// Observers can detect change with `Arc::ptr_eq` or by comparing revisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub revision: u64,
    pub light_mode: LightMode,
    pub lanes: BTreeMap<LaneId, LaneState>,
    pub last_attack: Option<AttackRecord>,
    pub incidents: Arc<IncidentLog>,
    pub series: Arc<TrafficSeries>,
    /// Arbitrary top-level telemetry merged from bulk updates.
    pub fields: Map<String, Value>,
}

impl DashboardSnapshot {
    /// Empty state for lanes `1..=lane_count`.
    pub fn initial(
        lane_count: u32,
        light_mode: LightMode,
        incident_capacity: usize,
        series_capacity: usize,
    ) -> Self {
        let lanes = (1..=lane_count)
            .map(LaneId::new)
            .map(|id| (id, LaneState::new(id)))
            .collect();

        Self {
            revision: 0,
            light_mode,
            lanes,
            last_attack: None,
            incidents: Arc::new(IncidentLog::new(incident_capacity)),
            series: Arc::new(TrafficSeries::new(series_capacity)),
            fields: Map::new(),
        }
    }

    /// A copy with the revision bumped, ready to be modified and published.
    pub(crate) fn successor(&self) -> Self {
        let mut next = self.clone();
        next.revision += 1;
        next
    }

    pub fn lane(&self, id: LaneId) -> Option<&LaneState> {
        self.lanes.get(&id)
    }

    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.lanes.keys().copied()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Lanes whose trust flag is currently cleared.
    pub fn unsecured_lanes(&self) -> Vec<LaneId> {
        self.lanes
            .values()
            .filter(|lane| !lane.secured)
            .map(|lane| lane.lane_id)
            .collect()
    }
}

/// What observers and `watch` consumers see: the snapshot plus link status.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub snapshot: Arc<DashboardSnapshot>,
    pub status: ConnectionStatus,
}

impl DashboardView {
    /// Short badge text for the connection indicator.
    pub fn badge(&self) -> &'static str {
        match self.status {
            ConnectionStatus::Connected => "Live",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Disconnected | ConnectionStatus::Error => "Offline/Cached Data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lane::LightColor;

    #[test]
    fn test_initial_snapshot() {
        let snapshot = DashboardSnapshot::initial(2, LightMode::PairedPrecedence, 10, 10);

        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.lanes.len(), 2);
        assert!(snapshot.lane(LaneId::new(1)).unwrap().secured);
        assert_eq!(snapshot.lane(LaneId::new(2)).unwrap().light, LightColor::Red);
        assert!(snapshot.lane(LaneId::new(3)).is_none());
        assert!(snapshot.unsecured_lanes().is_empty());
    }

    #[test]
    fn test_successor_bumps_revision_only() {
        let snapshot = DashboardSnapshot::initial(2, LightMode::Threshold, 10, 10);
        let next = snapshot.successor();

        assert_eq!(next.revision, 1);
        assert_eq!(next.lanes, snapshot.lanes);
        assert_eq!(snapshot.revision, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = DashboardSnapshot::initial(2, LightMode::Threshold, 10, 10);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["light_mode"], "threshold");
        assert_eq!(json["lanes"]["1"]["light"], "red");
    }
}
