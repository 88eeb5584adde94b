//! Shutdown coordination.
//!
//! [`channel`] returns the two ends of the coordinator. The
//! [`ShutdownHandle`] is cloned into whatever may need to stop the process
//! (the [`Errors`](crate::middleware::Errors) layer, the [`App`](crate::App),
//! your own handlers); the single [`ShutdownSignal`] goes to
//! [`Server::serve`](crate::Server::serve), which is the only place that
//! stops the listener and drains in-flight requests.
//!
//! Requests never block: when the buffer is full the request is dropped,
//! since a shutdown is already pending.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default number of pending requests the coordinator buffers.
pub const DEFAULT_BUFFER: usize = 1;

/// Why the process is shutting down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Requested from inside the application.
    Requested(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::Terminate => f.write_str("terminate"),
            Self::Requested(reason) => write!(f, "requested: {reason}"),
        }
    }
}

/// Creates a coordinator holding up to `buffer` pending requests (at least one).
pub fn channel(buffer: usize) -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Send side: asks the run loop to shut down.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownHandle {
    /// Best-effort, non-blocking. Returns `true` if the request was queued.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        match self.tx.try_send(reason) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(reason)) => {
                debug!(%reason, "shutdown already pending, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(reason)) => {
                warn!(%reason, "shutdown requested but nobody is listening");
                false
            }
        }
    }
}

/// Receive side, owned by the run loop.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: mpsc::Receiver<ShutdownReason>,
}

impl ShutdownSignal {
    /// Waits for the next shutdown request. `None` once every handle is gone.
    pub async fn recv(&mut self) -> Option<ShutdownReason> {
        self.rx.recv().await
    }

    /// Returns a pending request without waiting.
    pub fn try_recv(&mut self) -> Option<ShutdownReason> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_requests_in_order() {
        let (handle, mut signal) = channel(2);
        assert!(handle.request(ShutdownReason::Requested("db lost".into())));
        assert!(handle.clone().request(ShutdownReason::Terminate));

        assert_eq!(signal.recv().await, Some(ShutdownReason::Requested("db lost".into())));
        assert_eq!(signal.recv().await, Some(ShutdownReason::Terminate));
        assert_eq!(signal.try_recv(), None);
    }

    #[test]
    fn full_buffer_drops_without_blocking() {
        let (handle, mut signal) = channel(0);
        assert!(handle.request(ShutdownReason::Interrupt));
        assert!(!handle.request(ShutdownReason::Terminate));
        assert_eq!(signal.try_recv(), Some(ShutdownReason::Interrupt));
        assert_eq!(signal.try_recv(), None);
    }

    #[test]
    fn closed_signal_is_reported() {
        let (handle, signal) = channel(DEFAULT_BUFFER);
        drop(signal);
        assert!(!handle.request(ShutdownReason::Interrupt));
    }
}
