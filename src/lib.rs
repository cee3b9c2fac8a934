pub mod client;
pub mod config;
mod engine;
mod error;
pub mod model;
pub mod network;
pub mod observer;
pub mod state;

pub use client::DashboardClient;
pub use config::{DashboardConfig, ReconnectPolicy, SimulationConfig, SimulationStyle, TransportKind};
pub use error::DashboardError;
pub use model::{
    AttackRecord, DashboardSnapshot, DashboardView, IncidentLog, LaneId, LaneState, LightColor, LightMode,
};
pub use network::{ConnectionStatus, Transport, TransportSink};
pub use observer::{Notification, NotificationCause, Subscription};
