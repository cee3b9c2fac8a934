//! Dashboard configuration with tunable reconnect and simulation settings.

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::DashboardError;
use crate::model::incident::DEFAULT_INCIDENT_CAPACITY;
use crate::model::series::DEFAULT_SERIES_CAPACITY;
use crate::model::LightMode;

pub const ENV_ENDPOINT: &str = "LANEWATCH_ENDPOINT";
pub const ENV_RECONNECT_SECS: &str = "LANEWATCH_RECONNECT_SECS";
pub const ENV_LIGHT_MODE: &str = "LANEWATCH_LIGHT_MODE";
pub const ENV_LANES: &str = "LANEWATCH_LANES";
pub const ENV_SIM_SEED: &str = "LANEWATCH_SIM_SEED";

/// How long to wait before reconnecting after a close or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay every time (default: 5 s).
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`. Opt-in.
    Exponential { base: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based, reset on a successful open).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }
}

/// Which frame shapes the simulated source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStyle {
    /// One `vehicle_count` event per lane plus occasional `attack` events.
    Events,
    /// One bulk `{ lane1: {count, secure}, ..., timestamp }` frame per cycle.
    Bulk,
}

/// Settings for the scripted local source used when no endpoint is configured.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay before the simulated link reports itself open (default: 1 s)
    pub open_delay: Duration,
    /// Time between update cycles (default: 5 s)
    pub update_interval: Duration,
    /// Offset between consecutive lanes' updates within a cycle (default: 500 ms)
    pub lane_stagger: Duration,
    /// Chance of an attack event per cycle (default: 0.2)
    pub attack_probability: f64,
    /// Inclusive lower bound for generated counts (default: 5)
    pub min_count: u32,
    /// Exclusive upper bound for generated counts (default: 25)
    pub max_count: u32,
    /// Attack categories to draw from
    pub attack_categories: Vec<String>,
    pub style: SimulationStyle,
    /// Fixed seed for reproducible runs; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_secs(1),
            update_interval: Duration::from_secs(5),
            lane_stagger: Duration::from_millis(500),
            attack_probability: 0.2,
            min_count: 5,
            max_count: 25,
            attack_categories: vec!["DoS".into(), "Malformed Packet".into(), "Spoofing".into()],
            style: SimulationStyle::Events,
            seed: None,
        }
    }
}

/// Resolved transport choice for a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket(Url),
    Simulated,
}

/// Configuration for a [`DashboardClient`](crate::DashboardClient).
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Streaming endpoint; unset or placeholder values select the simulator (default: unset)
    pub endpoint: Option<String>,
    /// Reconnect delay policy (default: fixed 5 s)
    pub reconnect: ReconnectPolicy,
    /// Light derivation rule (default: paired precedence)
    pub light_mode: LightMode,
    /// Number of monitored lanes (default: 2)
    pub lane_count: u32,
    /// Incidents kept for the log view (default: 500)
    pub incident_capacity: usize,
    /// Samples kept in the traffic series (default: 24)
    pub series_capacity: usize,
    /// Client -> engine command queue depth (default: 32)
    pub command_buffer: usize,
    pub simulation: SimulationConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            reconnect: ReconnectPolicy::default(),
            light_mode: LightMode::default(),
            lane_count: 2,
            incident_capacity: DEFAULT_INCIDENT_CAPACITY,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            command_buffer: 32,
            simulation: SimulationConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Create a new config builder.
    pub fn builder() -> DashboardConfigBuilder {
        DashboardConfigBuilder::default()
    }

    /// Local simulated source with a fixed seed.
    pub fn simulated(seed: u64) -> Self {
        let mut config = Self::default();
        config.simulation.seed = Some(seed);
        config
    }

    /// Live WebSocket endpoint.
    pub fn live(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// Defaults overridden by `LANEWATCH_*` environment variables.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = Some(endpoint);
        }

        if let Some(raw) = lookup(ENV_RECONNECT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.reconnect = ReconnectPolicy::Fixed(Duration::from_secs(secs)),
                Err(_) => warn!("Ignoring {}={:?}: not a number of seconds", ENV_RECONNECT_SECS, raw),
            }
        }

        if let Some(raw) = lookup(ENV_LIGHT_MODE) {
            match LightMode::parse(&raw) {
                Some(mode) => config.light_mode = mode,
                None => warn!("Ignoring {}={:?}: expected threshold or paired", ENV_LIGHT_MODE, raw),
            }
        }

        if let Some(raw) = lookup(ENV_LANES) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.lane_count = n,
                _ => warn!("Ignoring {}={:?}: expected a positive lane count", ENV_LANES, raw),
            }
        }

        if let Some(raw) = lookup(ENV_SIM_SEED) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => config.simulation.seed = Some(seed),
                Err(_) => warn!("Ignoring {}={:?}: not a u64", ENV_SIM_SEED, raw),
            }
        }

        config
    }

    /// Decide between the live WebSocket and the local simulator.
    pub fn transport_kind(&self) -> Result<TransportKind, DashboardError> {
        match self.endpoint.as_deref().map(str::trim) {
            None => Ok(TransportKind::Simulated),
            Some(endpoint) if is_placeholder(endpoint) => Ok(TransportKind::Simulated),
            Some(endpoint) => Ok(TransportKind::WebSocket(Url::parse(endpoint)?)),
        }
    }
}

/// Endpoints copied from a config template that were never filled in.
pub fn is_placeholder(endpoint: &str) -> bool {
    let endpoint = endpoint.trim();
    endpoint.is_empty() || endpoint.contains("xxxx") || endpoint.starts_with("YOUR_")
}

/// Builder pattern for DashboardConfig.
#[derive(Default)]
pub struct DashboardConfigBuilder {
    config: DashboardConfig,
}

impl DashboardConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn light_mode(mut self, mode: LightMode) -> Self {
        self.config.light_mode = mode;
        self
    }

    pub fn lanes(mut self, count: u32) -> Self {
        self.config.lane_count = count;
        self
    }

    pub fn incident_capacity(mut self, capacity: usize) -> Self {
        self.config.incident_capacity = capacity;
        self
    }

    pub fn series_capacity(mut self, capacity: usize) -> Self {
        self.config.series_capacity = capacity;
        self
    }

    pub fn simulation(mut self, simulation: SimulationConfig) -> Self {
        self.config.simulation = simulation;
        self
    }

    pub fn build(self) -> DashboardConfig {
        self.config
    }
}
