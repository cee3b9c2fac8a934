//! Shallow spread-and-overwrite merge of partial updates.

use serde_json::{Map, Value};

use crate::model::DashboardSnapshot;

/// Fold a partial update into a new snapshot.
///
/// Every key in `update` replaces the snapshot field of the same name
/// wholesale (nested objects are not merged); every other field is kept.
/// The input snapshot is left untouched. Updates are applied in arrival
/// order with no timestamp reconciliation: last applied wins.
pub fn merge(snapshot: &DashboardSnapshot, update: &Map<String, Value>) -> DashboardSnapshot {
    let mut next = snapshot.successor();
    for (key, value) in update {
        next.fields.insert(key.clone(), value.clone());
    }
    next
}
