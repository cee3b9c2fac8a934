pub mod incident;
pub mod lane;
pub mod message;
pub mod series;
pub mod snapshot;

pub use incident::{AttackRecord, IncidentLog};
pub use lane::{LaneId, LaneState, LightColor, LightMode};
pub use message::{InboundMessage, LaneReport, TypedEvent};
pub use series::{TrafficSample, TrafficSeries};
pub use snapshot::{DashboardSnapshot, DashboardView};
