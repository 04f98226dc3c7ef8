//! Signal transport between contexts.
//!
//! A [`Signal`] is one notification frame: who sent it, which key it
//! travels under and the encoded event. Every context attached to a
//! transport observes every frame, including its own; filtering by origin
//! and key is the receiving bus's job.

use fieldline_core::{BusConfig, ContextId};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// One notification frame on a signal transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Context that sent the frame.
    pub origin: ContextId,
    /// Channel key the frame was sent under.
    pub key: String,
    /// JSON-encoded [`fieldline_core::BusEvent`].
    pub payload: String,
}

/// A receiver fell behind and `skipped` frames were lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalLagged {
    pub skipped: u64,
}

/// Frames observed by one receiver, in the order it saw them.
///
/// The stream ends when the transport closes.
pub type SignalStream = BoxStream<'static, Result<Signal, SignalLagged>>;

/// Pub/sub channel shared by every context of one origin.
///
/// Delivery is at-most-once per attached receiver. No ordering is promised
/// across senders and nothing is replayed to receivers that subscribe late.
pub trait SignalTransport: Send + Sync + 'static {
    /// Send a frame to every attached receiver.
    ///
    /// Returns how many receivers the frame was handed to. Zero receivers
    /// is not an error.
    fn send(&self, signal: Signal) -> usize;

    /// Attach a new receiver. Only frames sent after this call are observed.
    fn subscribe(&self) -> SignalStream;
}

/// In-process transport backed by a tokio broadcast channel.
///
/// Every `CrossTabBus` attached to the same hub behaves like a separate
/// tab of the same origin.
#[derive(Debug, Clone)]
pub struct LocalSignalHub {
    tx: broadcast::Sender<Signal>,
}

impl LocalSignalHub {
    /// Create a hub buffering up to `capacity` frames per receiver.
    ///
    /// Receivers that fall further behind than `capacity` lose the oldest
    /// frames.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Number of receivers currently attached.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalSignalHub {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}

impl SignalTransport for LocalSignalHub {
    fn send(&self, signal: Signal) -> usize {
        let origin = signal.origin;
        match self.tx.send(signal) {
            Ok(receivers) => {
                debug!(origin = %origin, receivers, "Sent bus signal");
                receivers
            }
            Err(_) => {
                debug!(origin = %origin, "No contexts attached for bus signal");
                0
            }
        }
    }

    fn subscribe(&self) -> SignalStream {
        BroadcastStream::new(self.tx.subscribe())
            .map(|frame| {
                frame.map_err(|err| match err {
                    BroadcastStreamRecvError::Lagged(skipped) => SignalLagged { skipped },
                })
            })
            .boxed()
    }
}
