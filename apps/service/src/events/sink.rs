use thiserror::Error;
use tokio::sync::mpsc;

use super::types::EventFrame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("subscriber disconnected")]
    Closed,
}

/// Output side of one observer connection
///
/// `send` must not block: the bus calls it while holding its registry lock.
pub trait EventSink: Send + Sync {
    fn send(&self, frame: &EventFrame) -> Result<(), SinkError>;
}

/// Sink backed by an unbounded channel; the receiving half feeds the transport
///
/// A burst larger than any fixed buffer (one frame per target in a cycle) is
/// queued rather than refused. Only a dropped receiver counts as a failed write.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EventFrame>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, frame: &EventFrame) -> Result<(), SinkError> {
        self.tx.send(frame.clone()).map_err(|_| SinkError::Closed)
    }
}
