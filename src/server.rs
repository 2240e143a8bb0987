//! Listener adapter: accept protocol upgrades on an HTTP endpoint and
//! hand each off as a connected [`Socket`].
//!
//! The listener serves no application content. Plain HTTP requests get a
//! minimal 200 with permissive cross-origin headers; upgrade requests
//! are validated by the protocol engine and either become `Connection`
//! events or are torn down without one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, header};
use hyper_util::rt::TokioIo;
use log::debug;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::create_response_with_body;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::ServerEvent;
use crate::socket::{Peer, Socket};

/// Counts one accepted raw connection for as long as it is held.
///
/// Handed from the HTTP service to the accepted socket when an upgrade
/// completes, so the connection stays counted for the socket's lifetime.
#[derive(Debug)]
pub(crate) struct ConnGuard(Arc<AtomicUsize>);

impl ConnGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

struct LoopCtx {
    protocols: Option<Vec<String>>,
    config: Config,
    events: mpsc::UnboundedSender<ServerEvent>,
    conn_count: Arc<AtomicUsize>,
    max_connections: Arc<AtomicUsize>,
    local_addr: SocketAddr,
}

struct ConnCtx {
    peer: Peer,
    guard: Mutex<Option<ConnGuard>>,
    ctx: Arc<LoopCtx>,
}

/// A passive endpoint that upgrades HTTP connections into sockets.
///
/// Owns its TCP listener exclusively. `listen` binds, `close` tears the
/// listener down with a terminal `Close` event; a closed listener is
/// never reused (a later `listen` binds a fresh one).
pub struct Server {
    protocols: Option<Vec<String>>,
    config: Config,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    conn_count: Arc<AtomicUsize>,
    max_connections: Arc<AtomicUsize>,
    local_addr: Option<SocketAddr>,
    listening: bool,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Server {
    /// Create a listener, optionally restricted to the given
    /// sub-protocol names.
    #[must_use]
    pub fn new(protocols: Option<Vec<String>>) -> Self {
        Self::with_config(protocols, Config::default())
    }

    /// Create a listener with a custom configuration for its accepted
    /// sockets.
    #[must_use]
    pub fn with_config(protocols: Option<Vec<String>>, config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            protocols,
            config,
            events_tx,
            events_rx,
            conn_count: Arc::new(AtomicUsize::new(0)),
            max_connections: Arc::new(AtomicUsize::new(0)),
            local_addr: None,
            listening: false,
            shutdown: None,
            task: None,
        }
    }

    /// Bind to `host:port` and start accepting.
    ///
    /// Resolves once the listener is bound; a `Listening` event follows.
    ///
    /// # Errors
    ///
    /// Fails when the bind fails or the listener is already listening.
    pub async fn listen(&mut self, port: u16, host: &str) -> Result<()> {
        if self.listening {
            return Err(Error::Io("server already listening".to_string()));
        }

        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(LoopCtx {
            protocols: self.protocols.clone(),
            config: self.config.clone(),
            events: self.events_tx.clone(),
            conn_count: self.conn_count.clone(),
            max_connections: self.max_connections.clone(),
            local_addr,
        });

        self.task = Some(tokio::spawn(accept_loop(listener, shutdown_rx, ctx)));
        self.shutdown = Some(shutdown_tx);
        self.local_addr = Some(local_addr);
        self.listening = true;

        debug!("listening on {local_addr}");
        let _ = self.events_tx.send(ServerEvent::Listening);
        Ok(())
    }

    /// Stop accepting and release the listener.
    ///
    /// Resolves once the accept loop has exited; a terminal `Close`
    /// event follows. Sockets already handed out keep running.
    ///
    /// # Errors
    ///
    /// Fails when the listener is not running.
    pub async fn close(&mut self) -> Result<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Err(Error::Io("server is not running".to_string()));
        };

        let _ = shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        self.listening = false;
        self.local_addr = None;
        let _ = self.events_tx.send(ServerEvent::Close);
        Ok(())
    }

    /// Await the next listener event.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events_rx.recv().await
    }

    /// Number of open connections accepted by this listener, including
    /// upgraded sockets still alive.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.conn_count.load(Ordering::Relaxed)
    }

    /// The bound address, when listening.
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the listener is currently bound.
    #[must_use]
    pub fn listening(&self) -> bool {
        self.listening
    }

    /// The connection cap (0 means unlimited).
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Relaxed)
    }

    /// Set the connection cap. Connections accepted beyond the cap are
    /// dropped immediately.
    pub fn set_max_connections(&mut self, max: usize) {
        self.max_connections.store(max, Ordering::Relaxed);
    }

    /// Accepted for API parity.
    pub fn ref_(&mut self) -> &mut Self {
        self
    }

    /// Accepted for API parity.
    pub fn unref(&mut self) -> &mut Self {
        self
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    ctx: Arc<LoopCtx>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let cap = ctx.max_connections.load(Ordering::Relaxed);
                    if cap != 0 && ctx.conn_count.load(Ordering::Relaxed) >= cap {
                        debug!("dropping connection from {remote}: at capacity");
                        continue;
                    }

                    let local = stream.local_addr().unwrap_or(ctx.local_addr);
                    let guard = ConnGuard::new(ctx.conn_count.clone());
                    let conn = Arc::new(ConnCtx {
                        peer: Peer {
                            local,
                            remote,
                            encrypted: false,
                        },
                        guard: Mutex::new(Some(guard)),
                        ctx: ctx.clone(),
                    });
                    tokio::spawn(serve(stream, conn));
                }
                Err(err) => {
                    let _ = ctx.events.send(ServerEvent::Error(err.into()));
                }
            },
        }
    }
}

async fn serve(stream: TcpStream, conn: Arc<ConnCtx>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let conn = conn.clone();
        async move { Ok::<_, std::convert::Infallible>(handle_request(req, &conn)) }
    });

    if let Err(err) = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!("http connection error: {err}");
    }
}

fn handle_request(mut req: Request<Incoming>, conn: &ConnCtx) -> Response<Empty<Bytes>> {
    if !is_upgrade_request(&req) {
        // The listener serves no application content.
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET,HEAD,OPTIONS")
            .body(Empty::new())
            .expect("static response");
    }

    let mut response = match create_response_with_body(&req, Empty::new) {
        Ok(response) => response,
        Err(err) => {
            debug!("rejected upgrade from {}: {err}", conn.peer.remote);
            return Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header(header::CONNECTION, "close")
                .body(Empty::new())
                .expect("static response");
        }
    };

    if let Some(protocol) = negotiate_protocol(req.headers(), conn.ctx.protocols.as_deref()) {
        if let Ok(value) = header::HeaderValue::from_str(&protocol) {
            response
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }
    }

    let on_upgrade = hyper::upgrade::on(&mut req);
    let guard = conn.guard.lock().expect("guard lock poisoned").take();
    let peer = conn.peer;
    let ctx = conn.ctx.clone();

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let mut ws_config = WebSocketConfig::default();
                ws_config.max_message_size = Some(ctx.config.backend_max_frame);
                ws_config.max_frame_size = Some(ctx.config.backend_max_frame);
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    Some(ws_config),
                )
                .await;

                let mut socket = Socket::with_config(ctx.config.clone());
                socket.accept(peer, ws);
                if let Some(guard) = guard {
                    socket.attach_guard(guard);
                }
                let _ = ctx.events.send(ServerEvent::Connection(socket));
            }
            Err(err) => {
                debug!("upgrade from {} failed: {err}", peer.remote);
            }
        }
    });

    response
}

fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    header_has_token(req.headers().get(header::CONNECTION), "upgrade")
        && header_has_token(req.headers().get(header::UPGRADE), "websocket")
}

fn header_has_token(value: Option<&header::HeaderValue>, token: &str) -> bool {
    value
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
        .unwrap_or(false)
}

/// Pick the first client-offered sub-protocol present in the configured
/// list.
fn negotiate_protocol(
    headers: &header::HeaderMap,
    supported: Option<&[String]>,
) -> Option<String> {
    let supported = supported?;
    let offered = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)?
        .to_str()
        .ok()?;

    offered
        .split(',')
        .map(str::trim)
        .find(|offer| supported.iter().any(|name| name == offer))
        .map(str::to_owned)
}
