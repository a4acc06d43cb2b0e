pub mod dispatcher;
pub mod observability;

pub use dispatcher::Dispatcher;
pub use observability::ObservableState;

use crate::error::ProxyError;
use crate::http::message::HttpResponse;
use crate::http::{reader, ParsedRequest};
use crate::metrics::Metrics;
use crate::pool::{ConfigProvider, PoolRegistry, Upstream};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pause between `stop()` finishing and `restart()` rebinding, giving the OS
/// time to release the port (§4.1).
const RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Upper bound on how long `stop()` waits for in-flight handlers to finish
/// before returning anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

struct Shared {
    registry: PoolRegistry,
    observability: ObservableState,
    dispatcher: Dispatcher,
    metrics: Metrics,
}

struct RunningServer {
    shutdown: Arc<Notify>,
    join: tokio::task::JoinHandle<()>,
}

/// The Local Proxy Pool's external façade (§6): `start`/`stop`/`restart`
/// plus read-through accessors for the menu layer. Constructed with an
/// injected `ConfigProvider` rather than reached for as a global singleton
/// (§9 Design Note).
pub struct Proxy {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningServer>>,
}

impl Proxy {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Result<Self, ProxyError> {
        Ok(Self {
            shared: Arc::new(Shared {
                registry: PoolRegistry::new(provider),
                observability: ObservableState::new(),
                dispatcher: Dispatcher::new()?,
                metrics: Metrics::install(),
            }),
            running: Mutex::new(None),
        })
    }

    /// Binds `127.0.0.1:<port>` and spawns the accept loop. Idempotent:
    /// calling `start` while already running is a no-op.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let port = self.shared.registry.port();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Internal(format!("failed to bind {addr}: {e}")))?;
        info!(addr = %addr, "proxy: acceptor listening");

        let shutdown = Arc::new(Notify::new());
        let shared = self.shared.clone();
        let shutdown_for_task = shutdown.clone();

        let join = tokio::spawn(async move {
            run_accept_loop(listener, shared, shutdown_for_task).await;
        });

        *running = Some(RunningServer { shutdown, join });
        Ok(())
    }

    /// Stops accepting new connections and waits (up to `DRAIN_TIMEOUT`) for
    /// outstanding handlers to finish their current request. Idempotent.
    pub async fn stop(&self) {
        let handle = self.running.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        handle.shutdown.notify_waiters();
        match tokio::time::timeout(DRAIN_TIMEOUT, handle.join).await {
            Ok(Ok(())) => info!("proxy: acceptor stopped"),
            Ok(Err(e)) => error!(error = %e, "proxy: accept loop task panicked"),
            Err(_) => warn!("proxy: drain timeout elapsed, accept loop task abandoned"),
        }
    }

    pub async fn restart(&self) -> Result<(), ProxyError> {
        self.stop().await;
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start().await
    }

    pub fn get_penalty(&self, upstream_id: Uuid) -> i64 {
        self.shared.registry.health().penalty(upstream_id)
    }

    pub fn current_upstream(&self) -> Option<Upstream> {
        self.shared.observability.current_upstream()
    }

    pub fn last_success(&self) -> Option<(Upstream, u64)> {
        self.shared.observability.last_success()
    }

    pub fn is_requesting(&self) -> bool {
        self.shared.observability.is_requesting()
    }

    /// Renders current metrics in Prometheus text exposition format, for an
    /// embedder that wants to scrape or display them.
    pub fn render_metrics(&self) -> String {
        self.shared.metrics.render()
    }
}

async fn run_accept_loop(listener: TcpListener, shared: Arc<Shared>, shutdown: Arc<Notify>) {
    let in_flight = Arc::new(AtomicI64::new(0));

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.notified() => {
                info!("proxy: acceptor draining, no longer accepting connections");
                break;
            }
        };

        let (stream, peer_addr) = match accepted {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "proxy: accept failed, continuing");
                metrics::counter!("switchboard_connections_total", "status" => "error").increment(1);
                continue;
            }
        };

        metrics::counter!("switchboard_connections_total", "status" => "accepted").increment(1);
        metrics::gauge!("switchboard_connections_active").increment(1.0);
        in_flight.fetch_add(1, Ordering::Relaxed);

        let shared = shared.clone();
        let in_flight = in_flight.clone();

        tokio::spawn(async move {
            handle_connection(stream, peer_addr, &shared).await;
            metrics::gauge!("switchboard_connections_active").decrement(1.0);
            in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }

    while in_flight.load(Ordering::Relaxed) > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Handles exactly one request/response exchange and then closes the
/// connection — no keep-alive (§1 Non-goals, §4.1 Lifecycle).
async fn handle_connection(mut stream: TcpStream, peer_addr: SocketAddr, shared: &Arc<Shared>) {
    let raw = match reader::read_request(&mut stream).await {
        Ok(raw) => raw,
        Err(ProxyError::PayloadTooLarge(msg)) => {
            warn!(peer = %peer_addr, error = %msg, "proxy: request headers exceeded 1 MiB bound");
            let _ = write_response(&mut stream, HttpResponse::json_error(413, &msg)).await;
            return;
        }
        Err(e) => {
            debug!(peer = %peer_addr, error = %e, "proxy: read failed, closing connection silently");
            return;
        }
    };

    let request: ParsedRequest = match ParsedRequest::parse(&raw.buffer, raw.header_end) {
        Ok(req) => req,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "proxy: malformed request");
            let _ = write_response(&mut stream, HttpResponse::json_error(400, &e.to_string())).await;
            return;
        }
    };

    let snapshot = shared.registry.snapshot();
    let timeout = Duration::from_secs(shared.registry.request_timeout_seconds());

    let response = shared
        .dispatcher
        .dispatch(
            &request,
            &snapshot,
            shared.registry.health(),
            &shared.observability,
            timeout,
        )
        .await;

    let status = response.status;
    metrics::counter!("switchboard_requests_total", "status" => status.to_string()).increment(1);

    let _ = write_response(&mut stream, response).await;
}

async fn write_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    stream.write_all(&response.serialize()).await
}
