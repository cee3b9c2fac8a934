//! Traffic light derivation from vehicle counts.
//!
//! Two rules exist side by side:
//! - **Threshold**: each lane on its own (`< 10` green, `< 20` yellow, else red)
//! - **Paired precedence**: the strictly busiest lane gets green, the rest red;
//!   a tie for busiest leaves every light as it was, so yellow never appears

use std::collections::BTreeMap;

use crate::model::{LaneId, LaneState, LightColor, LightMode};

/// Counts at or above this are at least yellow.
pub const YELLOW_THRESHOLD: u32 = 10;
/// Counts at or above this are red.
pub const RED_THRESHOLD: u32 = 20;

/// Per-lane color from a single count.
#[inline]
pub fn threshold_color(count: u32) -> LightColor {
    if count < YELLOW_THRESHOLD {
        LightColor::Green
    } else if count < RED_THRESHOLD {
        LightColor::Yellow
    } else {
        LightColor::Red
    }
}

/// Colors under the precedence rule, or `None` when the busiest count is tied.
pub fn precedence_colors(lanes: &BTreeMap<LaneId, LaneState>) -> Option<BTreeMap<LaneId, LightColor>> {
    let busiest = lanes.values().map(|lane| lane.vehicle_count).max()?;

    let mut leaders = lanes.values().filter(|lane| lane.vehicle_count == busiest);
    let winner = leaders.next()?.lane_id;
    if leaders.next().is_some() {
        return None;
    }

    Some(
        lanes
            .keys()
            .map(|&id| {
                let color = if id == winner { LightColor::Green } else { LightColor::Red };
                (id, color)
            })
            .collect(),
    )
}

/// Recompute every lane's light in place under `mode`.
///
/// Threshold mode colors every lane that has reported. Paired mode only
/// ever shows red or green: precedence applies once every lane has
/// reported a count, and until then every light stays as it was. Callers
/// switching modes reset lights with [`reset_lights`] first.
pub fn derive_lights(mode: LightMode, lanes: &mut BTreeMap<LaneId, LaneState>) {
    match mode {
        LightMode::PairedPrecedence => {
            if !lanes.values().all(LaneState::has_reported) {
                return;
            }
            // tie: leave lights untouched
            if let Some(colors) = precedence_colors(lanes) {
                for (id, color) in colors {
                    if let Some(lane) = lanes.get_mut(&id) {
                        lane.light = color;
                    }
                }
            }
        }
        LightMode::Threshold => {
            for lane in lanes.values_mut().filter(|lane| lane.has_reported()) {
                lane.light = threshold_color(lane.vehicle_count);
            }
        }
    }
}

/// Put every light back to its initial red.
pub fn reset_lights(lanes: &mut BTreeMap<LaneId, LaneState>) {
    for lane in lanes.values_mut() {
        lane.light = LightColor::Red;
    }
}
