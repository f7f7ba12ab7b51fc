use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Errors returned when delivering into a sink.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The owner cancelled before or during delivery.
    #[error("delivery cancelled")]
    Cancelled,
    /// Every receiver was dropped.
    #[error("sink receiver is closed")]
    ReceiverClosed,
}

/// Producer half of a bounded channel whose sends abort on cancellation.
///
/// Only the owning worker holds a `Sink`; dropping it closes the channel.
#[derive(Debug)]
pub struct Sink<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

/// Consumer half shared by any number of readers.
#[derive(Debug)]
pub struct SinkReceiver<T> {
    rx: Mutex<mpsc::Receiver<T>>,
}

/// Create a bounded sink tied to `cancel` (`capacity >= 1`).
pub fn bounded<T>(capacity: usize, cancel: CancellationToken) -> (Sink<T>, SinkReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Sink { tx, cancel },
        SinkReceiver { rx: Mutex::new(rx) },
    )
}

impl<T> Sink<T> {
    /// Deliver one value, blocking while the sink is full.
    ///
    /// Cancellation wins over a pending or ready send.
    pub async fn emit(&self, value: T) -> Result<(), SinkError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SinkError::Cancelled),
            sent = self.tx.send(value) => sent.map_err(|_| SinkError::ReceiverClosed),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl<T> SinkReceiver<T> {
    /// Next value, or `None` once the producer is gone and the buffer drained.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking read used by tests and pollers.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}
