use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Transport failed to open: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    SocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Recoverable: the caller decides whether to queue, retry or drop.
    #[error("Not connected")]
    NotConnected,

    #[error("Engine channel closed")]
    ChannelClosed,

    #[error("Invalid URL")]
    UrlParseError(#[from] url::ParseError),

    #[error("Unknown lane: {0}")]
    UnknownLane(String),
}

impl DashboardError {
    /// Errors a dashboard can shrug off and keep running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ChannelClosed)
    }
}
