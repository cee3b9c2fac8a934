//! Callback registry for snapshot and status notifications.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::model::DashboardSnapshot;
use crate::network::ConnectionStatus;

/// Why a notification was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationCause {
    /// The connection status moved.
    StatusChanged,
    /// A new snapshot was published from a count, bulk update or operator action.
    SnapshotUpdated,
    /// An attack/tamper incident was recorded.
    IncidentRecorded,
    /// An outbound send was refused because the link is not connected.
    SendRejected,
}

impl NotificationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCause::StatusChanged => "status_changed",
            NotificationCause::SnapshotUpdated => "snapshot_updated",
            NotificationCause::IncidentRecorded => "incident_recorded",
            NotificationCause::SendRejected => "send_rejected",
        }
    }
}

impl fmt::Display for NotificationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What every observer receives.
#[derive(Debug, Clone)]
pub struct Notification {
    pub cause: NotificationCause,
    pub snapshot: Arc<DashboardSnapshot>,
    pub status: ConnectionStatus,
}

pub type ObserverFn = dyn Fn(&Notification) + Send + Sync;

type Entries = Mutex<Vec<(u64, Arc<ObserverFn>)>>;

/// Ordered set of observer callbacks.
///
/// The lock is never held while a callback runs, so callbacks may register
/// or unregister observers (including themselves) freely.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Arc<Entries>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; it is called after every previously registered one.
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, Arc::new(callback)));
        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Deliver `notification` to each observer in registration order.
    ///
    /// Observers removed part-way through are skipped for the rest of the pass;
    /// observers added part-way through are first called on the next pass.
    pub fn notify(&self, notification: &Notification) {
        let pass: Vec<(u64, Arc<ObserverFn>)> = lock(&self.entries).clone();

        for (id, callback) in pass {
            let live = lock(&self.entries).iter().any(|(entry, _)| *entry == id);
            if live {
                callback(notification);
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

/// Handle returned by [`ObserverRegistry::register`].
///
/// Dropping the handle keeps the observer registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    entries: Weak<Entries>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(entries) = self.entries.upgrade() else {
            return false;
        };
        let mut entries = lock(&entries);
        let before = entries.len();
        entries.retain(|(id, _)| *id != self.id);
        entries.len() != before
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, Vec<(u64, Arc<ObserverFn>)>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
