use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use super::transport::{LinkCommand, Transport, TransportEvent, TransportEventKind, TransportSink};
use super::ConnectionStatus;
use crate::config::ReconnectPolicy;
use crate::error::DashboardError;

/// Everything that can wake the connection manager besides a user command.
#[derive(Debug)]
pub enum ConnectionEvent {
    Transport(TransportEvent),
    ReconnectDue { timer: u64 },
}

struct Link {
    generation: u64,
    commands: mpsc::UnboundedSender<LinkCommand>,
    // detached on drop; a closing link finishes its handshake on its own
    _task: JoinHandle<()>,
}

impl Link {
    fn close(self) {
        // the link may already be gone
        let _ = self.commands.send(LinkCommand::Close);
    }
}

struct ReconnectTimer {
    id: u64,
    task: JoinHandle<()>,
}

/// Owner of the single logical connection.
///
/// Not a task itself: the engine feeds it commands and [`ConnectionEvent`]s
/// one at a time, so every state change happens in arrival order. At most
/// one link and one reconnect timer exist at any moment, and events from
/// superseded links are dropped by generation.
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    status: ConnectionStatus,
    link: Option<Link>,
    generation: u64,
    timer: Option<ReconnectTimer>,
    next_timer: u64,
    attempts: u32,
    user_closed: bool,
    transitions: Vec<ConnectionStatus>,
}

impl ConnectionManager {
    pub fn new(
        transport: Box<dyn Transport>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            transport,
            policy,
            events,
            status: ConnectionStatus::Disconnected,
            link: None,
            generation: 0,
            timer: None,
            next_timer: 0,
            attempts: 0,
            user_closed: false,
            transitions: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn has_transport(&self) -> bool {
        self.link.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Status changes since the last call, oldest first.
    pub fn take_transitions(&mut self) -> Vec<ConnectionStatus> {
        std::mem::take(&mut self.transitions)
    }

    /// Open a link unless one is open or opening.
    pub fn connect(&mut self) {
        if self.status.is_live() {
            debug!("connect() ignored: already {}", self.status);
            return;
        }

        self.user_closed = false;
        self.cancel_reconnect();
        self.open_link();
    }

    /// Close the link and stop reconnecting until the next `connect()`.
    pub fn disconnect(&mut self) {
        self.user_closed = true;
        self.cancel_reconnect();

        if let Some(link) = self.link.take() {
            info!("Closing {} link (generation {})", self.transport.name(), link.generation);
            link.close();
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Serialize and transmit `message`. Only valid while connected.
    pub fn send(&mut self, message: &Value) -> Result<(), DashboardError> {
        if self.status != ConnectionStatus::Connected {
            return Err(DashboardError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(DashboardError::NotConnected)?;

        let text = serde_json::to_string(message)?;
        trace!("-> {}", text);
        link.commands
            .send(LinkCommand::Send(text))
            .map_err(|_| DashboardError::NotConnected)
    }

    /// Process one event. Returns inbound frame text for the caller to decode.
    pub fn handle(&mut self, event: ConnectionEvent) -> Option<String> {
        match event {
            ConnectionEvent::Transport(event) => self.handle_transport(event),
            ConnectionEvent::ReconnectDue { timer } => {
                self.handle_reconnect_due(timer);
                None
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Option<String> {
        let current = self.link.as_ref().map(|link| link.generation);
        if current != Some(event.generation) {
            trace!("Dropping {:?} from stale link (generation {})", event.kind, event.generation);
            return None;
        }

        match event.kind {
            TransportEventKind::Opened => {
                info!("Connected via {} transport", self.transport.name());
                self.attempts = 0;
                self.set_status(ConnectionStatus::Connected);
                None
            }
            TransportEventKind::Message(text) => Some(text),
            TransportEventKind::Error(err) => {
                error!("Transport error: {}", err);
                if let Some(link) = self.link.take() {
                    link.close();
                }
                self.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
                None
            }
            TransportEventKind::Closed => {
                warn!("Connection closed");
                self.link = None;
                self.set_status(ConnectionStatus::Disconnected);
                self.schedule_reconnect();
                None
            }
        }
    }

    fn handle_reconnect_due(&mut self, timer: u64) {
        match &self.timer {
            Some(pending) if pending.id == timer => self.timer = None,
            _ => {
                trace!("Ignoring cancelled reconnect timer {}", timer);
                return;
            }
        }

        if self.user_closed || self.link.is_some() {
            return;
        }
        info!("Reconnecting (attempt {})", self.attempts);
        self.open_link();
    }

    fn open_link(&mut self) {
        self.generation += 1;
        let generation = self.generation;

        let (commands, receiver) = mpsc::unbounded_channel();
        let sink = TransportSink::new(generation, self.events.clone());
        let task = tokio::spawn(self.transport.open(sink, receiver));

        debug!("Opening {} link (generation {})", self.transport.name(), generation);
        self.link = Some(Link {
            generation,
            commands,
            _task: task,
        });
        self.set_status(ConnectionStatus::Connecting);
    }

    fn schedule_reconnect(&mut self) {
        if self.user_closed {
            return;
        }
        self.cancel_reconnect();

        let delay = self.policy.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);

        self.next_timer += 1;
        let id = self.next_timer;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(ConnectionEvent::ReconnectDue { timer: id });
        });

        info!("Reconnecting in {:?}", delay);
        self.timer = Some(ReconnectTimer { id, task });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!("Status {} -> {}", self.status, status);
            self.status = status;
            self.transitions.push(status);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Opened = Arc<Mutex<Vec<(TransportSink, mpsc::UnboundedReceiver<LinkCommand>)>>>;

    /// Records every open; the test plays the remote side by hand.
    #[derive(Default, Clone)]
    struct ScriptedTransport {
        opened: Opened,
    }

    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn open(
            &mut self,
            sink: TransportSink,
            commands: mpsc::UnboundedReceiver<LinkCommand>,
        ) -> BoxFuture<'static, ()> {
            self.opened.lock().unwrap().push((sink, commands));
            Box::pin(async {})
        }
    }

    fn manager() -> (ConnectionManager, Opened, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let transport = ScriptedTransport::default();
        let opened = transport.opened.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(Box::new(transport), ReconnectPolicy::default(), tx);
        (manager, opened, rx)
    }

    fn sink(opened: &Opened, index: usize) -> TransportSink {
        opened.lock().unwrap()[index].0.clone()
    }

    async fn pump(manager: &mut ConnectionManager, rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Option<String> {
        let event = rx.recv().await.unwrap();
        manager.handle(event)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_lifecycle() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        assert_eq!(manager.status(), ConnectionStatus::Connecting);

        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;

        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(
            manager.take_transitions(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let (mut manager, opened, _rx) = manager();
        manager.connect();
        manager.connect();
        manager.connect();

        assert_eq!(opened.lock().unwrap().len(), 1);
        assert_eq!(manager.take_transitions(), vec![ConnectionStatus::Connecting]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_pass_through() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;

        sink(&opened, 0).message(r#"{"uptime": 1}"#);
        let text = pump(&mut manager, &mut rx).await;

        assert_eq!(text.as_deref(), Some(r#"{"uptime": 1}"#));
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let (mut manager, opened, mut rx) = manager();
        assert!(matches!(manager.send(&json!({"a": 1})), Err(DashboardError::NotConnected)));

        manager.connect();
        assert!(matches!(manager.send(&json!({"a": 1})), Err(DashboardError::NotConnected)));

        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;
        manager.send(&json!({"type": "getHistoricalData"})).unwrap();

        let mut guard = opened.lock().unwrap();
        let command = guard[0].1.try_recv().unwrap();
        assert_eq!(command, LinkCommand::Send(r#"{"type":"getHistoricalData"}"#.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_close_reconnects_after_delay() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;
        manager.take_transitions();

        sink(&opened, 0).closed();
        pump(&mut manager, &mut rx).await;

        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(manager.reconnect_pending());
        assert!(!manager.has_transport());

        // nothing before the delay
        tokio::time::advance(Duration::from_millis(4_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(200)).await;
        pump(&mut manager, &mut rx).await;

        assert_eq!(manager.status(), ConnectionStatus::Connecting);
        assert_eq!(opened.lock().unwrap().len(), 2);
        assert_eq!(
            manager.take_transitions(),
            vec![ConnectionStatus::Disconnected, ConnectionStatus::Connecting]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_drops_link_and_reconnects() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();

        sink(&opened, 0).error(DashboardError::ConnectionError("connection refused".into()));
        pump(&mut manager, &mut rx).await;

        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert!(!manager.has_transport());
        assert!(manager.reconnect_pending());

        // the failed link told to close
        let command = opened.lock().unwrap()[0].1.try_recv().unwrap();
        assert_eq!(command, LinkCommand::Close);

        tokio::time::advance(Duration::from_secs(5)).await;
        pump(&mut manager, &mut rx).await;
        assert_eq!(manager.status(), ConnectionStatus::Connecting);
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_loss_events_keep_one_timer() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;

        // error, then the close that follows it, then a duplicate close
        let link = sink(&opened, 0);
        link.error(DashboardError::ConnectionError("reset by peer".into()));
        link.closed();
        link.closed();
        for _ in 0..3 {
            pump(&mut manager, &mut rx).await;
        }

        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert!(manager.reconnect_pending());

        tokio::time::advance(Duration::from_secs(5)).await;
        pump(&mut manager, &mut rx).await;
        assert_eq!(opened.lock().unwrap().len(), 2);
        assert!(!manager.reconnect_pending());

        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(opened.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_suppresses_late_close() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).opened();
        pump(&mut manager, &mut rx).await;

        manager.disconnect();
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        // the close acknowledgment arrives after disconnect() returned
        sink(&opened, 0).closed();
        pump(&mut manager, &mut rx).await;

        assert!(!manager.reconnect_pending());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(opened.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).closed();
        pump(&mut manager, &mut rx).await;
        assert!(manager.reconnect_pending());

        manager.disconnect();
        assert!(!manager.reconnect_pending());

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(opened.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_backoff_cancels_timer() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).closed();
        pump(&mut manager, &mut rx).await;

        manager.connect();
        assert!(!manager.reconnect_pending());
        assert_eq!(opened.lock().unwrap().len(), 2);

        // the aborted timer never fires a second open
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(opened.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_ignored() {
        let (mut manager, opened, mut rx) = manager();
        manager.connect();
        sink(&opened, 0).closed();
        pump(&mut manager, &mut rx).await;
        manager.connect();

        // old link speaks up after being replaced
        sink(&opened, 0).message(r#"{"stale": true}"#);
        assert_eq!(pump(&mut manager, &mut rx).await, None);

        sink(&opened, 1).opened();
        pump(&mut manager, &mut rx).await;
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_policy_grows_and_resets() {
        let transport = ScriptedTransport::default();
        let opened = transport.opened.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
        };
        let mut manager = ConnectionManager::new(Box::new(transport), policy, tx);

        manager.connect();
        sink(&opened, 0).error(DashboardError::ConnectionError("refused".into()));
        pump(&mut manager, &mut rx).await;

        // first retry after 1 s
        tokio::time::advance(Duration::from_secs(1)).await;
        pump(&mut manager, &mut rx).await;
        sink(&opened, 1).error(DashboardError::ConnectionError("refused".into()));
        pump(&mut manager, &mut rx).await;

        // second after 2 s
        tokio::time::advance(Duration::from_millis(1_500)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(500)).await;
        pump(&mut manager, &mut rx).await;
        assert_eq!(opened.lock().unwrap().len(), 3);

        // a successful open resets the schedule
        sink(&opened, 2).opened();
        pump(&mut manager, &mut rx).await;
        sink(&opened, 2).closed();
        pump(&mut manager, &mut rx).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        pump(&mut manager, &mut rx).await;
        assert_eq!(opened.lock().unwrap().len(), 4);
    }
}
