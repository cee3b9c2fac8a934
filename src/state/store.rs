use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::lights::{derive_lights, reset_lights};
use super::merge::merge;
use super::security;
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::model::{
    DashboardSnapshot, InboundMessage, LaneId, LaneReport, LightMode, TrafficSample, TypedEvent,
};
use crate::observer::NotificationCause;

/// Holder of the current snapshot.
///
/// Every mutation builds a successor snapshot and swaps the `Arc`, so
/// snapshots handed out earlier never change underneath their readers.
#[derive(Debug, Clone)]
pub struct DashboardStore {
    current: Arc<DashboardSnapshot>,
}

impl DashboardStore {
    pub fn new(initial: DashboardSnapshot) -> Self {
        Self {
            current: Arc::new(initial),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(DashboardSnapshot::initial(
            config.lane_count,
            config.light_mode,
            config.incident_capacity,
            config.series_capacity,
        ))
    }

    /// Shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.current.clone()
    }

    pub fn current(&self) -> &DashboardSnapshot {
        &self.current
    }

    /// Decode and apply one raw text frame.
    pub fn apply_frame(&mut self, raw: &str) -> Result<NotificationCause, DashboardError> {
        let message = InboundMessage::parse(raw)?;
        self.apply(message)
    }

    /// Apply a decoded message. On error the snapshot is unchanged.
    pub fn apply(&mut self, message: InboundMessage) -> Result<NotificationCause, DashboardError> {
        match message {
            InboundMessage::Event(TypedEvent::VehicleCount { lane, vehicle_count }) => {
                self.apply_count(&lane, vehicle_count)?;
                Ok(NotificationCause::SnapshotUpdated)
            }
            InboundMessage::Event(TypedEvent::Attack {
                category,
                description,
                lane,
            }) => {
                let hint = lane.as_deref().and_then(LaneId::parse);
                self.record_incident(&category, &description, hint);
                Ok(NotificationCause::IncidentRecorded)
            }
            InboundMessage::Update(update) => {
                self.apply_update(&update);
                Ok(NotificationCause::SnapshotUpdated)
            }
        }
    }

    fn apply_count(&mut self, label: &str, count: u32) -> Result<(), DashboardError> {
        let lane = LaneId::parse(label)
            .filter(|id| self.current.lanes.contains_key(id))
            .ok_or_else(|| DashboardError::UnknownLane(label.to_string()))?;

        let now = Utc::now();
        let mut next = self.current.successor();
        if let Some(state) = next.lanes.get_mut(&lane) {
            state.vehicle_count = count;
            state.reported_at = Some(now);
        }
        derive_lights(next.light_mode, &mut next.lanes);
        push_sample(&mut next);

        debug!("{} count {} -> lights {:?}", lane, count, light_summary(&next));
        self.current = Arc::new(next);
        Ok(())
    }

    fn apply_update(&mut self, update: &Map<String, Value>) {
        let mut next = merge(&self.current, update);
        let now = Utc::now();
        let mut counts_changed = false;

        for (key, value) in update {
            let Some(lane) = LaneId::parse(key).filter(|id| next.lanes.contains_key(id)) else {
                continue;
            };
            let Some(report) = LaneReport::from_value(value) else {
                continue;
            };
            let Some(state) = next.lanes.get_mut(&lane) else {
                continue;
            };

            if let Some(count) = report.count {
                state.vehicle_count = count;
                state.reported_at = Some(now);
                counts_changed = true;
            }

            match report.secure {
                Some(false) if state.secured => {
                    warn!("{} reported unsecured by upstream", lane);
                    state.secured = false;
                }
                Some(true) if !state.secured => {
                    info!("{} reported secure by upstream", lane);
                    state.secured = true;
                }
                _ => {}
            }
        }

        if counts_changed {
            derive_lights(next.light_mode, &mut next.lanes);
            push_sample(&mut next);
        }

        debug!("merged {} key(s) into revision {}", update.len(), next.revision);
        self.current = Arc::new(next);
    }

    /// Record an incident stamped with the current time.
    pub fn record_incident(&mut self, category: &str, description: &str, lane_hint: Option<LaneId>) {
        let next = security::record_incident(&self.current, category, description, lane_hint, Utc::now());
        self.current = Arc::new(next);
    }

    pub fn restore_security(&mut self, lane: LaneId) -> Result<(), DashboardError> {
        let next = security::restore_security(&self.current, lane)?;
        self.current = Arc::new(next);
        Ok(())
    }

    /// Switch the light rule and recompute every light under it.
    pub fn set_light_mode(&mut self, mode: LightMode) {
        let mut next = self.current.successor();
        // lights from the old rule mean nothing under the new one
        if next.light_mode != mode {
            reset_lights(&mut next.lanes);
        }
        next.light_mode = mode;
        derive_lights(mode, &mut next.lanes);
        info!("Light mode set to {}", mode);
        self.current = Arc::new(next);
    }
}

fn push_sample(snapshot: &mut DashboardSnapshot) {
    let counts: BTreeMap<LaneId, u32> = snapshot
        .lanes
        .iter()
        .map(|(id, lane)| (*id, lane.vehicle_count))
        .collect();
    Arc::make_mut(&mut snapshot.series).push(TrafficSample { at: Utc::now(), counts });
}

fn light_summary(snapshot: &DashboardSnapshot) -> Vec<(LaneId, &'static str)> {
    snapshot
        .lanes
        .values()
        .map(|lane| (lane.lane_id, lane.light.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LightColor;
    use serde_json::json;

    fn store(mode: LightMode) -> DashboardStore {
        DashboardStore::new(DashboardSnapshot::initial(2, mode, 50, 24))
    }

    fn count_frame(lane: &str, count: u32) -> String {
        json!({"type": "vehicle_count", "lane": lane, "vehicle_count": count}).to_string()
    }

    fn light(store: &DashboardStore, n: u32) -> LightColor {
        store.current().lane(LaneId::new(n)).unwrap().light
    }

    #[test]
    fn test_threshold_scenario() {
        let mut store = store(LightMode::Threshold);
        store.apply_frame(&count_frame("Lane 1", 8)).unwrap();
        store.apply_frame(&count_frame("Lane 2", 15)).unwrap();

        assert_eq!(light(&store, 1), LightColor::Green);
        assert_eq!(light(&store, 2), LightColor::Yellow);
        assert_eq!(store.current().series.len(), 2);
    }

    #[test]
    fn test_paired_scenario() {
        let mut store = store(LightMode::PairedPrecedence);
        store.apply_frame(&count_frame("Lane 1", 22)).unwrap();
        store.apply_frame(&count_frame("Lane 2", 18)).unwrap();

        assert_eq!(light(&store, 1), LightColor::Green);
        assert_eq!(light(&store, 2), LightColor::Red);
    }

    #[test]
    fn test_unknown_lane_is_rejected() {
        let mut store = store(LightMode::Threshold);
        let before = store.snapshot();

        let result = store.apply_frame(&count_frame("Lane 7", 3));

        assert!(matches!(result, Err(DashboardError::UnknownLane(_))));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_malformed_frame_leaves_snapshot() {
        let mut store = store(LightMode::Threshold);
        let before = store.snapshot();

        assert!(store.apply_frame("{not json").is_err());
        assert!(store.apply_frame("[1, 2, 3]").is_err());
        assert!(store.apply_frame(r#"{"type": "vehicle_count", "lane": "Lane 1"}"#).is_err());

        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_attack_event() {
        let mut store = store(LightMode::Threshold);
        let frame = json!({
            "type": "attack",
            "category": "Unauthorized access",
            "description": "Unauthorized access on Lane 2"
        });

        let cause = store.apply_frame(&frame.to_string()).unwrap();

        assert_eq!(cause, NotificationCause::IncidentRecorded);
        assert_eq!(store.current().unsecured_lanes(), vec![LaneId::new(2)]);
        assert_eq!(store.current().incidents.len(), 1);
    }

    #[test]
    fn test_bulk_update() {
        let mut store = store(LightMode::Threshold);
        let frame = json!({
            "lane1": {"count": 8, "secure": true},
            "lane2": {"count": 25, "secure": false},
            "timestamp": "2024-05-01T10:00:00Z"
        });

        let cause = store.apply_frame(&frame.to_string()).unwrap();
        let snapshot = store.current();

        assert_eq!(cause, NotificationCause::SnapshotUpdated);
        assert_eq!(snapshot.field("timestamp"), Some(&json!("2024-05-01T10:00:00Z")));
        assert_eq!(snapshot.lane(LaneId::new(1)).unwrap().vehicle_count, 8);
        assert_eq!(light(&store, 1), LightColor::Green);
        assert_eq!(light(&store, 2), LightColor::Red);
        assert_eq!(store.current().unsecured_lanes(), vec![LaneId::new(2)]);
        assert_eq!(store.current().series.len(), 1);

        // a later bulk frame restores it
        store
            .apply_frame(&json!({"lane2": {"secure": true}}).to_string())
            .unwrap();
        assert!(store.current().unsecured_lanes().is_empty());
        // no count in that frame: no new sample
        assert_eq!(store.current().series.len(), 1);
    }

    #[test]
    fn test_plain_partial_update() {
        let mut store = store(LightMode::Threshold);
        store.apply_frame(r#"{"uptime": 99.5}"#).unwrap();
        store.apply_frame(r#"{"type": "stats", "blocked": 3}"#).unwrap();

        let snapshot = store.current();
        assert_eq!(snapshot.field("uptime"), Some(&json!(99.5)));
        assert_eq!(snapshot.field("type"), Some(&json!("stats")));
        assert_eq!(snapshot.revision, 2);
        assert!(snapshot.series.is_empty());
    }

    #[test]
    fn test_set_light_mode_recomputes() {
        let mut store = store(LightMode::Threshold);
        store.apply_frame(&count_frame("Lane 1", 12)).unwrap();
        store.apply_frame(&count_frame("Lane 2", 3)).unwrap();
        assert_eq!(light(&store, 1), LightColor::Yellow);

        store.set_light_mode(LightMode::PairedPrecedence);

        assert_eq!(store.current().light_mode, LightMode::PairedPrecedence);
        assert_eq!(light(&store, 1), LightColor::Green);
        assert_eq!(light(&store, 2), LightColor::Red);
    }

    #[test]
    fn test_paired_tie_never_yellow() {
        let mut store = store(LightMode::PairedPrecedence);
        store.apply_frame(&count_frame("Lane 1", 15)).unwrap();
        assert_eq!(light(&store, 1), LightColor::Red);

        store.apply_frame(&count_frame("Lane 2", 15)).unwrap();
        assert_eq!(light(&store, 1), LightColor::Red);
        assert_eq!(light(&store, 2), LightColor::Red);

        // a later strict winner still gets green
        store.apply_frame(&count_frame("Lane 2", 16)).unwrap();
        assert_eq!(light(&store, 1), LightColor::Red);
        assert_eq!(light(&store, 2), LightColor::Green);
    }

    #[test]
    fn test_switch_to_paired_with_tied_counts() {
        for count in [5, 12, 25] {
            let mut store = store(LightMode::Threshold);
            store.apply_frame(&count_frame("Lane 1", count)).unwrap();
            store.apply_frame(&count_frame("Lane 2", count)).unwrap();

            store.set_light_mode(LightMode::PairedPrecedence);

            assert_eq!(light(&store, 1), LightColor::Red, "count {count}");
            assert_eq!(light(&store, 2), LightColor::Red, "count {count}");
        }
    }

    #[test]
    fn test_same_mode_keeps_precedence_result() {
        let mut store = store(LightMode::PairedPrecedence);
        store.apply_frame(&count_frame("Lane 1", 22)).unwrap();
        store.apply_frame(&count_frame("Lane 2", 18)).unwrap();
        store.apply_frame(&count_frame("Lane 2", 22)).unwrap();

        store.set_light_mode(LightMode::PairedPrecedence);

        assert_eq!(light(&store, 1), LightColor::Green);
        assert_eq!(light(&store, 2), LightColor::Red);
    }

    #[test]
    fn test_published_snapshots_are_immutable() {
        let mut store = store(LightMode::Threshold);
        let old = store.snapshot();

        store.apply_frame(&count_frame("lane1", 30)).unwrap();
        store.record_incident("DoS", "flood on Lane 1", None);

        assert_eq!(old.revision, 0);
        assert_eq!(old.lane(LaneId::new(1)).unwrap().vehicle_count, 0);
        assert!(old.incidents.is_empty());
        assert!(store.current().revision > old.revision);
    }

    #[test]
    fn test_restore_security() {
        let mut store = store(LightMode::Threshold);
        store.record_incident("Tamper", "Tampering on Lane 1", None);
        store.restore_security(LaneId::new(1)).unwrap();

        assert!(store.current().unsecured_lanes().is_empty());
        assert!(store.restore_security(LaneId::new(5)).is_err());
    }
}
