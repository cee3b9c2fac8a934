use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::connection::ConnectionEvent;
use crate::error::DashboardError;

/// Instructions from the connection manager to one open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Send(String),
    Close,
}

#[derive(Debug)]
pub enum TransportEventKind {
    Opened,
    Message(String),
    Error(DashboardError),
    Closed,
}

/// Something a link reported, tagged with the generation of the link.
#[derive(Debug)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Where a link reports its lifecycle and inbound frames.
///
/// Every method returns `false` once the manager is gone, at which point
/// the link should stop.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl TransportSink {
    pub fn new(generation: u64, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEventKind::Opened)
    }

    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEventKind::Message(text.into()))
    }

    pub fn error(&self, error: DashboardError) -> bool {
        self.emit(TransportEventKind::Error(error))
    }

    pub fn closed(&self) -> bool {
        self.emit(TransportEventKind::Closed)
    }

    fn emit(&self, kind: TransportEventKind) -> bool {
        self.events
            .send(ConnectionEvent::Transport(TransportEvent {
                generation: self.generation,
                kind,
            }))
            .is_ok()
    }
}

/// A way of opening links to the data source.
///
/// `open` is called once per connection attempt. The returned future is
/// spawned by the manager and drives the link: it reports through `sink`
/// and takes outbound frames from `commands` until it sees
/// [`LinkCommand::Close`], the command channel closes, or the link fails.
pub trait Transport: Send + 'static {
    fn name(&self) -> &'static str;

    fn open(
        &mut self,
        sink: TransportSink,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
    ) -> BoxFuture<'static, ()>;
}

impl Transport for Box<dyn Transport> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn open(
        &mut self,
        sink: TransportSink,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
    ) -> BoxFuture<'static, ()> {
        (**self).open(sink, commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(7, tx);

        assert!(sink.opened());
        assert!(sink.message("{}"));

        match rx.recv().await {
            Some(ConnectionEvent::Transport(event)) => {
                assert_eq!(event.generation, 7);
                assert!(matches!(event.kind, TransportEventKind::Opened));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_reports_dropped_manager() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(1, tx);
        drop(rx);

        assert!(!sink.closed());
    }
}
