use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{DashboardConfig, TransportKind};
use crate::engine::{Command, Engine};
use crate::error::DashboardError;
use crate::model::{DashboardSnapshot, DashboardView, LaneId, LightMode};
use crate::network::{ConnectionManager, ConnectionStatus, SimulatedTransport, Transport, WebSocketTransport};
use crate::observer::{Notification, ObserverRegistry, Subscription};
use crate::state::DashboardStore;

/// Handle to a running dashboard engine.
///
/// All state lives on the engine task; this handle only sends commands and
/// reads published views. Dropping it shuts the engine down.
pub struct DashboardClient {
    // Channel to send commands to the engine
    command_sender: mpsc::Sender<Command>,
    observers: Arc<ObserverRegistry>,
    view: watch::Receiver<DashboardView>,
    engine: JoinHandle<()>,
}

impl DashboardClient {
    /// Start an engine with the transport `config` selects.
    ///
    /// Must be called from within a Tokio runtime. The link stays closed
    /// until [`connect`](Self::connect).
    pub fn start(config: DashboardConfig) -> Result<Self, DashboardError> {
        let transport: Box<dyn Transport> = match config.transport_kind()? {
            TransportKind::WebSocket(url) => Box::new(WebSocketTransport::new(url)),
            TransportKind::Simulated => {
                info!("No live endpoint configured, using simulated feed");
                Box::new(SimulatedTransport::new(config.simulation.clone(), config.lane_count))
            }
        };
        Ok(Self::with_transport(config, transport))
    }

    /// Start an engine over a caller-supplied transport.
    pub fn with_transport(config: DashboardConfig, transport: impl Transport) -> Self {
        let (tx_user_cmd, rx_engine_cmd) = mpsc::channel(config.command_buffer.max(1));
        let (tx_events, rx_events) = mpsc::unbounded_channel();

        let store = DashboardStore::from_config(&config);
        let (tx_view, rx_view) = watch::channel(DashboardView {
            snapshot: store.snapshot(),
            status: ConnectionStatus::Disconnected,
        });

        let observers = Arc::new(ObserverRegistry::new());
        let manager = ConnectionManager::new(Box::new(transport), config.reconnect, tx_events);
        let engine = Engine::new(manager, store, observers.clone(), tx_view, rx_engine_cmd, rx_events);

        // Spawn the engine in background
        let engine = tokio::spawn(engine.run());

        Self {
            command_sender: tx_user_cmd,
            observers,
            view: rx_view,
            engine,
        }
    }

    /// Open the link. No-op while connected or connecting.
    pub async fn connect(&self) -> Result<(), DashboardError> {
        self.request(Command::Connect).await
    }

    /// Close the link and cancel any pending reconnect.
    ///
    /// Resolves once the engine has done both; no reconnect follows.
    pub async fn disconnect(&self) -> Result<(), DashboardError> {
        self.request(Command::Disconnect).await
    }

    /// Send a JSON value upstream. Fails with `NotConnected` unless connected.
    pub async fn send(&self, message: Value) -> Result<(), DashboardError> {
        self.request(|ack| Command::Send(message, ack)).await?
    }

    /// Ask the server for its historical data set.
    pub async fn request_historical_data(&self) -> Result<(), DashboardError> {
        self.send(json!({ "type": "getHistoricalData" })).await
    }

    /// Report a lane's security flag upstream.
    pub async fn push_security(&self, lane: LaneId, secure: bool) -> Result<(), DashboardError> {
        self.send(json!({
            "type": "updateSecurity",
            "lane": lane.key(),
            "secure": secure,
        }))
        .await
    }

    /// Record an incident locally, as if it had arrived from the feed.
    pub async fn record_incident(
        &self,
        category: impl Into<String>,
        description: impl Into<String>,
        lane: Option<LaneId>,
    ) -> Result<(), DashboardError> {
        let category = category.into();
        let description = description.into();
        self.request(|ack| Command::RecordIncident {
            category,
            description,
            lane,
            ack,
        })
        .await
    }

    /// Operator action: mark `lane` secure again.
    pub async fn restore_security(&self, lane: LaneId) -> Result<(), DashboardError> {
        self.request(|ack| Command::RestoreSecurity(lane, ack)).await?
    }

    pub async fn set_light_mode(&self, mode: LightMode) -> Result<(), DashboardError> {
        self.request(|ack| Command::SetLightMode(mode, ack)).await
    }

    /// Register a callback for every notification, run on the engine task.
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.observers.register(callback)
    }

    /// Latest published view.
    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.view.borrow().snapshot.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.view.borrow().status
    }

    /// Receiver that wakes on every published view.
    pub fn watch(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    /// Disconnect, stop the engine and wait for it to finish.
    pub async fn shutdown(self) -> Result<(), DashboardError> {
        let Self {
            command_sender,
            engine,
            ..
        } = self;
        drop(command_sender);
        engine.await.map_err(|_| DashboardError::ChannelClosed)
    }

    /// Helper to send a command and wait for the engine's ack
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, DashboardError> {
        let (ack, done) = oneshot::channel();
        self.command_sender
            .send(build(ack))
            .await
            .map_err(|_| DashboardError::ChannelClosed)?;
        done.await.map_err(|_| DashboardError::ChannelClosed)
    }
}
