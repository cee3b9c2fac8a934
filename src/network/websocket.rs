use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::transport::{LinkCommand, Transport, TransportSink};
use crate::error::DashboardError;

/// Live link to a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn open(
        &mut self,
        sink: TransportSink,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(run_link(self.url.clone(), sink, commands))
    }
}

async fn run_link(url: Url, sink: TransportSink, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
    info!("Connecting to {}...", url);

    let ws_stream = tokio::select! {
        biased;
        // closed before the handshake finished
        _ = wait_for_close(&mut commands) => {
            sink.closed();
            return;
        }
        result = connect_async(url.as_str()) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                error!("Connection failed: {}", e);
                sink.error(DashboardError::ConnectionError(format!("{}: {}", url, e)));
                return;
            }
        },
    };

    if !sink.opened() {
        return;
    }

    // 'write' sends frames upstream, 'read' listens for pushed updates
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !sink.message(text.to_string()) {
                            break; // manager dropped
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed the socket: {:?}", frame);
                        sink.closed();
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                    }
                    Some(Ok(other)) => {
                        debug!("Ignoring non-text frame ({} bytes)", other.len());
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        sink.error(DashboardError::SocketError(e));
                        break;
                    }
                    None => {
                        warn!("Stream ended unexpectedly");
                        sink.closed();
                        break;
                    }
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(LinkCommand::Send(payload)) => {
                        if let Err(e) = write.send(Message::Text(payload.into())).await {
                            error!("Failed to send frame: {}", e);
                            sink.error(DashboardError::SocketError(e));
                            break;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        info!("Closing WebSocket to {}", url);
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Close frame not delivered: {}", e);
                        }
                        sink.closed();
                        break;
                    }
                }
            }
        }
    }
}

async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<LinkCommand>) {
    loop {
        match commands.recv().await {
            Some(LinkCommand::Close) | None => return,
            Some(LinkCommand::Send(_)) => {
                warn!("Dropping outbound frame: socket not open yet");
            }
        }
    }
}
