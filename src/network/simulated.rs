//! Local stand-in for the sensor feed, used when no endpoint is configured.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::transport::{LinkCommand, Transport, TransportSink};
use crate::config::{SimulationConfig, SimulationStyle};
use crate::model::{LaneId, TypedEvent};

/// Scripted source emitting lane counts and occasional attack events.
///
/// With a seed, every link it opens replays the same sequence of values.
pub struct SimulatedTransport {
    config: SimulationConfig,
    lane_count: u32,
    rng: StdRng,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig, lane_count: u32) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            lane_count,
            rng,
        }
    }
}

impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn open(
        &mut self,
        sink: TransportSink,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
    ) -> BoxFuture<'static, ()> {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(self.rng.random()),
        };
        Box::pin(run_link(self.config.clone(), self.lane_count, rng, sink, commands))
    }
}

async fn run_link(
    config: SimulationConfig,
    lane_count: u32,
    mut rng: StdRng,
    sink: TransportSink,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
) {
    tokio::select! {
        _ = sleep(config.open_delay) => {}
        _ = wait_for_close(&mut commands) => {
            sink.closed();
            return;
        }
    }

    info!("Simulated feed open ({} lanes)", lane_count);
    if !sink.opened() {
        return;
    }

    let mut ticker = interval_at(Instant::now() + config.update_interval, config.update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: VecDeque<(Instant, String)> = VecDeque::new();

    loop {
        let next_due = pending.front().map(|(at, _)| *at).unwrap_or_else(Instant::now);

        tokio::select! {
            biased;
            cmd = commands.recv() => {
                match cmd {
                    Some(LinkCommand::Send(payload)) => {
                        debug!("Simulated feed dropping outbound frame: {}", payload);
                    }
                    Some(LinkCommand::Close) | None => {
                        info!("Simulated feed closed");
                        sink.closed();
                        return;
                    }
                }
            }
            _ = sleep_until(next_due), if !pending.is_empty() => {
                if let Some((_, frame)) = pending.pop_front() {
                    if !sink.message(frame) {
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                let start = Instant::now();
                for (offset, frame) in cycle_frames(&config, lane_count, &mut rng) {
                    pending.push_back((start + offset, frame));
                }
            }
        }
    }
}

/// Frames for one update cycle, each with its offset from the cycle start.
fn cycle_frames(config: &SimulationConfig, lane_count: u32, rng: &mut StdRng) -> Vec<(Duration, String)> {
    match config.style {
        SimulationStyle::Events => event_frames(config, lane_count, rng),
        SimulationStyle::Bulk => vec![(Duration::ZERO, bulk_frame(config, lane_count, rng))],
    }
}

fn event_frames(config: &SimulationConfig, lane_count: u32, rng: &mut StdRng) -> Vec<(Duration, String)> {
    let mut frames = Vec::with_capacity(lane_count as usize + 1);

    for (i, lane) in (1..=lane_count).map(LaneId::new).enumerate() {
        let event = TypedEvent::VehicleCount {
            lane: lane.label(),
            vehicle_count: random_count(config, rng),
        };
        frames.push((config.lane_stagger * i as u32, encode(&event)));
    }

    if !config.attack_categories.is_empty() && rng.random_bool(config.attack_probability.clamp(0.0, 1.0)) {
        let category = &config.attack_categories[rng.random_range(0..config.attack_categories.len())];
        let event = TypedEvent::Attack {
            category: category.clone(),
            description: format!("Simulated {} attack detected", category),
            lane: None,
        };
        let offset = config.lane_stagger * lane_count.saturating_sub(1);
        frames.push((offset, encode(&event)));
    }

    frames
}

fn bulk_frame(config: &SimulationConfig, lane_count: u32, rng: &mut StdRng) -> String {
    let tampered = if lane_count > 0 && rng.random_bool(config.attack_probability.clamp(0.0, 1.0)) {
        Some(rng.random_range(1..=lane_count))
    } else {
        None
    };

    let mut frame = Map::new();
    for lane in (1..=lane_count).map(LaneId::new) {
        frame.insert(
            lane.key(),
            json!({
                "count": random_count(config, rng),
                "secure": tampered != Some(lane.number()),
            }),
        );
    }
    frame.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
    Value::Object(frame).to_string()
}

fn random_count(config: &SimulationConfig, rng: &mut StdRng) -> u32 {
    // max is exclusive unless it leaves an empty range
    let hi = config.max_count.saturating_sub(1).max(config.min_count);
    rng.random_range(config.min_count..=hi)
}

fn encode(event: &TypedEvent) -> String {
    // a TypedEvent is plain strings and integers
    serde_json::to_string(event).unwrap_or_default()
}

async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<LinkCommand>) {
    loop {
        match commands.recv().await {
            Some(LinkCommand::Close) | None => return,
            Some(LinkCommand::Send(payload)) => {
                debug!("Simulated feed dropping outbound frame: {}", payload);
            }
        }
    }
}
