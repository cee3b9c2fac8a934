//! The single task that owns the connection, the store and the observers.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::DashboardError;
use crate::model::{DashboardView, LaneId, LightMode};
use crate::network::{ConnectionEvent, ConnectionManager, ConnectionStatus};
use crate::observer::{Notification, NotificationCause, ObserverRegistry};
use crate::state::DashboardStore;

/// Requests from a [`DashboardClient`](crate::DashboardClient) handle.
///
/// Each carries an ack that resolves once the engine has fully processed it.
pub(crate) enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Send(Value, oneshot::Sender<Result<(), DashboardError>>),
    RecordIncident {
        category: String,
        description: String,
        lane: Option<LaneId>,
        ack: oneshot::Sender<()>,
    },
    RestoreSecurity(LaneId, oneshot::Sender<Result<(), DashboardError>>),
    SetLightMode(LightMode, oneshot::Sender<()>),
}

pub(crate) struct Engine {
    manager: ConnectionManager,
    store: DashboardStore,
    observers: Arc<ObserverRegistry>,
    view: watch::Sender<DashboardView>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Engine {
    pub(crate) fn new(
        manager: ConnectionManager,
        store: DashboardStore,
        observers: Arc<ObserverRegistry>,
        view: watch::Sender<DashboardView>,
        commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self {
            manager,
            store,
            observers,
            view,
            commands,
            events,
        }
    }

    /// Runs until every client handle is gone, then closes the link.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("Client handles dropped, shutting down engine...");
                            break;
                        }
                    }
                }
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }
            }
        }

        self.manager.disconnect();
        self.flush_transitions();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(ack) => {
                self.manager.connect();
                self.flush_transitions();
                let _ = ack.send(());
            }
            Command::Disconnect(ack) => {
                self.manager.disconnect();
                self.flush_transitions();
                let _ = ack.send(());
            }
            Command::Send(message, ack) => {
                let result = self.manager.send(&message);
                if let Err(DashboardError::NotConnected) = &result {
                    warn!("Send rejected: connection is {}", self.manager.status());
                    self.publish(NotificationCause::SendRejected);
                }
                let _ = ack.send(result);
            }
            Command::RecordIncident {
                category,
                description,
                lane,
                ack,
            } => {
                self.store.record_incident(&category, &description, lane);
                self.publish(NotificationCause::IncidentRecorded);
                let _ = ack.send(());
            }
            Command::RestoreSecurity(lane, ack) => {
                let result = self.store.restore_security(lane);
                if result.is_ok() {
                    self.publish(NotificationCause::SnapshotUpdated);
                }
                let _ = ack.send(result);
            }
            Command::SetLightMode(mode, ack) => {
                self.store.set_light_mode(mode);
                self.publish(NotificationCause::SnapshotUpdated);
                let _ = ack.send(());
            }
        }
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        let inbound = self.manager.handle(event);
        self.flush_transitions();

        let Some(raw) = inbound else {
            return;
        };

        match self.store.apply_frame(&raw) {
            Ok(cause) => {
                debug!("Applied frame -> revision {}", self.store.current().revision);
                self.publish(cause);
            }
            Err(e) => {
                warn!("Discarding frame: {} ({})", e, truncate(&raw, 120));
            }
        }
    }

    /// One `StatusChanged` per transition, in order.
    fn flush_transitions(&mut self) {
        for status in self.manager.take_transitions() {
            self.notify(NotificationCause::StatusChanged, status);
        }
    }

    fn publish(&self, cause: NotificationCause) {
        self.notify(cause, self.manager.status());
    }

    fn notify(&self, cause: NotificationCause, status: ConnectionStatus) {
        let snapshot = self.store.snapshot();
        self.view.send_replace(DashboardView {
            snapshot: snapshot.clone(),
            status,
        });
        self.observers.notify(&Notification {
            cause,
            snapshot,
            status,
        });
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
