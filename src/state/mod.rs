//! Dashboard state: merging, light derivation and security correlation.
//!
//! All functions here are pure over [`DashboardSnapshot`](crate::model::DashboardSnapshot):
//! they take the current snapshot by reference and return its successor.
//! [`DashboardStore`] holds the current one for the engine.

pub mod lights;
pub mod merge;
pub mod security;
pub mod store;

pub use lights::{derive_lights, precedence_colors, reset_lights, threshold_color};
pub use merge::merge;
pub use security::{implicated_lanes, record_incident, restore_security};
pub use store::DashboardStore;
