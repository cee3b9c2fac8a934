//! Tamper/attack correlation onto per-lane trust flags.
//!
//! A lane loses its `secured` flag only when an incident names it, and gets
//! it back only through an explicit restoration. Nothing expires on a timer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::DashboardError;
use crate::model::{AttackRecord, DashboardSnapshot, LaneId};

/// Lanes named in an incident description, in lane order.
pub fn implicated_lanes(snapshot: &DashboardSnapshot, description: &str) -> Vec<LaneId> {
    snapshot
        .lane_ids()
        .filter(|lane| lane.mentioned_in(description))
        .collect()
}

/// Record an incident stamped `at` and clear the trust flag of the lane(s) it names.
///
/// A `lane_hint` for a configured lane wins over the description; otherwise
/// every lane whose label appears in the description is cleared. Lanes not
/// named are never touched.
pub fn record_incident(
    snapshot: &DashboardSnapshot,
    category: &str,
    description: &str,
    lane_hint: Option<LaneId>,
    at: DateTime<Utc>,
) -> DashboardSnapshot {
    let targets = match lane_hint.filter(|lane| snapshot.lanes.contains_key(lane)) {
        Some(lane) => vec![lane],
        None => implicated_lanes(snapshot, description),
    };

    let record = AttackRecord {
        category: category.to_string(),
        description: description.to_string(),
        timestamp: at,
        lanes: targets.clone(),
    };

    let mut next = snapshot.successor();
    for lane in &targets {
        if let Some(state) = next.lanes.get_mut(lane) {
            if state.secured {
                warn!("{} marked unsecured: {} ({})", lane, category, description);
            }
            state.secured = false;
        }
    }

    Arc::make_mut(&mut next.incidents).push(record.clone());
    next.last_attack = Some(record);
    next
}

/// Operator or upstream restoration of a lane's trust flag.
///
/// The incident history is left as is.
pub fn restore_security(snapshot: &DashboardSnapshot, lane: LaneId) -> Result<DashboardSnapshot, DashboardError> {
    if !snapshot.lanes.contains_key(&lane) {
        return Err(DashboardError::UnknownLane(lane.label()));
    }

    let mut next = snapshot.successor();
    if let Some(state) = next.lanes.get_mut(&lane) {
        if !state.secured {
            info!("{} security restored", lane);
        }
        state.secured = true;
    }
    Ok(next)
}
