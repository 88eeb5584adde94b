//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! The server stops on the first of:
//!
//! - **SIGTERM** (sent by `kubectl` and the Kubernetes control plane) or
//!   **SIGINT** (Ctrl-C, for local dev);
//! - a [`ShutdownReason`] arriving on the app's shutdown channel, e.g. after a
//!   handler returned [`Error::Shutdown`](crate::Error::Shutdown).
//!
//! The server then:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Asks every open connection to close once its current request is done.
//! 3. Waits up to the shutdown timeout for in-flight requests to complete.
//! 4. Cancels whatever is still running and returns from [`Server::serve`].
//!
//! Set `terminationGracePeriodSeconds` in your pod spec to a value longer
//! than the shutdown timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::config::ServerConfig;
use crate::error::{ConfigError, Error, ServeError};
use crate::request::Request;
use crate::response::Response;
use crate::shutdown::{ShutdownReason, ShutdownSignal};

/// The HTTP server.
#[derive(Clone, Debug)]
pub struct Server {
    addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddr`] if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use kiln::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, ConfigError> {
        let addr = addr.parse().map_err(|_| ConfigError::InvalidAddr(addr.to_owned()))?;
        Ok(Self { addr, shutdown_timeout: ServerConfig::default().shutdown_timeout() })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self { addr: config.socket_addr()?, shutdown_timeout: config.shutdown_timeout() })
    }

    /// How long in-flight requests get to finish once shutdown starts.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Binds the listener and serves `app` until shutdown.
    ///
    /// `signal` is the receiving end of the channel whose handle `app` was
    /// built with.
    pub async fn serve(self, app: App, signal: ShutdownSignal) -> Result<(), ServeError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_listener(listener, app, signal).await
    }

    /// Like [`serve`](Server::serve), on a listener the caller already bound.
    /// The configured address is ignored.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        app: App,
        mut signal: ShutdownSignal,
    ) -> Result<(), ServeError> {
        let local_addr = listener.local_addr()?;

        // The app is read-only from here on and shared by every connection task.
        let app = Arc::new(app);

        // `draining` asks connections to wind down; `root` cancels the
        // requests still running once the drain timeout has passed.
        let draining = CancellationToken::new();
        let root = CancellationToken::new();

        info!(addr = %local_addr, "kiln listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let os_signal = os_signal();
        tokio::pin!(os_signal);

        let reason = loop {
            tokio::select! {
                // `biased` makes select! check arms top-to-bottom instead of
                // randomly, so a shutdown request immediately stops accepting
                // new connections, even if more are queued.
                biased;

                reason = &mut os_signal => break reason,

                Some(reason) = signal.recv() => break reason,

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let draining = draining.clone();
                    let cancel = root.child_token();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not once
                        // per connection.
                        let svc = service_fn(move |req| {
                            handle(Arc::clone(&app), req, remote_addr, cancel.clone())
                        });

                        // `auto::Builder` handles both HTTP/1.1 and HTTP/2,
                        // whatever the client negotiates.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            () = draining.cancelled() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = res {
                            debug!(peer = %remote_addr, "connection closed: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        };

        info!(%reason, in_flight = tasks.len(), "shutdown started, draining connections");
        drop(listener);
        draining.cancel();

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout = ?self.shutdown_timeout,
                "drain timed out, cancelling in-flight requests",
            );
            root.cancel();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!("kiln stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Reads the body, then hands the request to the app.
///
/// Returning `Err` makes hyper drop the connection without a response, which
/// is what a cancelled request gets.
async fn handle(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "reading request body: {e}");
            let status = http::StatusCode::BAD_REQUEST;
            return Ok(Response::builder()
                .status(status)
                .text(status.canonical_reason().unwrap_or(""))
                .into_inner());
        }
    };

    let req = Request::from(http::Request::from_parts(parts, body)).with_remote_addr(remote_addr);
    app.dispatch(req, cancel).await.map(Response::into_inner)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// A signal whose handler cannot be installed is logged and never fires.
/// On Windows only Ctrl-C is available.
async fn os_signal() -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves, so on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => ShutdownReason::Interrupt,
        () = sigterm => ShutdownReason::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_rejects_bad_addr() {
        assert!(matches!(Server::bind("nope"), Err(ConfigError::InvalidAddr(a)) if a == "nope"));
        assert!(Server::bind("127.0.0.1:0").is_ok());
    }

    #[test]
    fn from_config_takes_timeout() {
        let config = ServerConfig { shutdown_timeout_ms: 5, ..ServerConfig::default() };
        let server = Server::from_config(&config).unwrap();
        assert_eq!(server.shutdown_timeout, Duration::from_millis(5));
        assert_eq!(server.addr.port(), 3000);
    }
}
