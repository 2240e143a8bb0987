use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

use crate::close::CloseCode;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{Data, Event};
use crate::payload::{Encoding, max_base64_len};
use crate::server::ConnGuard;
use crate::socket::driver::{self, Command, DriverEvent};

/// Address family of a socket's remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Family {
    /// IPv4.
    #[default]
    V4,
    /// IPv6.
    V6,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// Remote addressing snapshot returned by [`Socket::address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    /// Remote address (IP literal or the hostname given to `connect`).
    pub address: String,
    /// Address family.
    pub family: Family,
    /// Remote port.
    pub port: u16,
}

/// Addressing taken from the raw connection an upgrade arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    /// Local side of the raw connection.
    pub local: std::net::SocketAddr,
    /// Remote side of the raw connection.
    pub remote: std::net::SocketAddr,
    /// Whether the raw connection is encrypted.
    pub encrypted: bool,
}

/// Capability profile of a backend handle, fixed at construction.
///
/// `Stream` backends support byte-oriented backpressure accounting,
/// pause/resume and drain signaling. `Message` backends (the browser
/// WebSocket profile) only expose a fire-and-forget message send:
/// writes always report "not backpressured", drain is never signaled,
/// and pause/resume are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Full stream capabilities.
    Stream,
    /// Message-send only.
    Message,
}

/// Counters and limits shared between a socket and its driver task.
///
/// The driver checks limits per message, so `set_max_frame` takes
/// effect for frames that arrive after the call.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) max_frame: AtomicUsize,
    pub(crate) max_base64: AtomicUsize,
    pub(crate) bytes_read: AtomicU64,
    pub(crate) bytes_written: AtomicU64,
    pub(crate) buffer_size: AtomicU64,
    pub(crate) pending: AtomicU64,
    pub(crate) backpressured: AtomicBool,
    pub(crate) high_water: u64,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            max_frame: AtomicUsize::new(config.max_frame),
            max_base64: AtomicUsize::new(config.max_base64()),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            buffer_size: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            backpressured: AtomicBool::new(false),
            high_water: config.write_high_water as u64,
        }
    }
}

#[derive(Debug)]
struct Handle {
    cmd: mpsc::UnboundedSender<Command>,
    kind: BackendKind,
}

/// One logical bidirectional byte stream over a WebSocket connection.
///
/// A socket owns exactly one backend handle for its lifetime: the handle
/// is bound once via [`Socket::accept`] or [`Socket::connect`] and only
/// cleared at destruction. Destruction is terminal; a destroyed socket
/// cannot be rebound or revived.
#[derive(Debug)]
pub struct Socket {
    config: Config,
    shared: Arc<Shared>,
    handle: Option<Handle>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    out: VecDeque<Event>,
    finished: bool,
    guard: Option<ConnGuard>,

    connecting: bool,
    destroyed: bool,
    readable: bool,
    writable: bool,
    encrypted: bool,
    encoding: Option<Encoding>,

    local_address: String,
    local_port: u16,
    remote_address: String,
    remote_family: Family,
    remote_port: u16,
}

impl Socket {
    /// Create an unconnected socket with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an unconnected socket with a custom configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared::new(&config)),
            config,
            handle: None,
            events_tx,
            events_rx,
            out: VecDeque::new(),
            finished: false,
            guard: None,
            connecting: false,
            destroyed: false,
            readable: true,
            writable: true,
            encrypted: false,
            encoding: None,
            local_address: "127.0.0.1".to_string(),
            local_port: 0,
            remote_address: "127.0.0.1".to_string(),
            remote_family: Family::V4,
            remote_port: 0,
        }
    }

    /// Bind an upgraded server-side stream with full stream capabilities.
    ///
    /// Addressing and the encryption flag are copied from the raw
    /// connection the upgrade arrived on. The socket is immediately
    /// active; accepted sockets do not emit a `Connect` event.
    ///
    /// # Panics
    ///
    /// Panics if the socket already has a backend handle.
    pub fn accept<S>(&mut self, peer: Peer, ws: WebSocketStream<S>) -> &mut Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.accept_with(peer, ws, BackendKind::Stream)
    }

    /// Bind an upgraded server-side stream with an explicit capability
    /// profile.
    ///
    /// # Panics
    ///
    /// Panics if the socket already has a backend handle.
    pub fn accept_with<S>(&mut self, peer: Peer, ws: WebSocketStream<S>, kind: BackendKind) -> &mut Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        assert!(self.handle.is_none(), "cannot accept twice");

        self.encrypted = peer.encrypted;
        self.local_address = peer.local.ip().to_string();
        self.local_port = peer.local.port();
        self.remote_address = peer.remote.ip().to_string();
        self.remote_family = if peer.remote.is_ipv6() {
            Family::V6
        } else {
            Family::V4
        };
        self.remote_port = peer.remote.port();
        self.connecting = false;

        let cmd = driver::spawn_stream(ws, kind, self.shared.clone(), self.events_tx.clone());
        self.handle = Some(Handle { cmd, kind });
        self
    }

    /// Dial a WebSocket endpoint as a client.
    ///
    /// The host defaults to the loopback address. A literal IPv6 host
    /// (contains `:` and is not already bracketed) is bracketed and the
    /// family recorded as IPv6; everything else is assumed IPv4. No real
    /// address-family detection is attempted.
    ///
    /// The socket is marked connecting; a `Connect` event fires once the
    /// handshake completes.
    ///
    /// # Panics
    ///
    /// Panics if the socket already has a backend handle.
    pub fn connect(
        &mut self,
        port: u16,
        host: Option<&str>,
        secure: bool,
        protocols: &[&str],
    ) -> &mut Self {
        assert!(self.handle.is_none(), "cannot connect twice");

        let host = host.unwrap_or("127.0.0.1");
        let mut hostname = host.to_string();
        let mut family = Family::V4;

        if host.contains(':') && !host.starts_with('[') {
            hostname = format!("[{host}]");
            family = Family::V6;
        }

        let scheme = if secure { "wss" } else { "ws" };
        let url = format!("{scheme}://{hostname}:{port}/");

        self.encrypted = secure;
        self.local_address = host.to_string();
        self.local_port = port;
        self.remote_address = host.to_string();
        self.remote_family = family;
        self.remote_port = port;
        self.connecting = true;

        let dial = driver::Dial {
            url,
            protocols: protocols.iter().map(|p| (*p).to_string()).collect(),
            origin: self.config.origin.clone(),
            user_agent: self.config.user_agent.clone(),
            backend_max_frame: self.config.backend_max_frame,
        };
        let cmd = driver::spawn_client(dial, self.shared.clone(), self.events_tx.clone());
        self.handle = Some(Handle {
            cmd,
            kind: BackendKind::Stream,
        });
        self
    }

    /// Await the next event for this socket.
    ///
    /// Events are strictly ordered per socket. Returns `None` after the
    /// terminal `Close` event has been delivered.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.out.pop_front() {
                if matches!(event, Event::Close) {
                    self.finished = true;
                }
                return Some(event);
            }

            if self.finished {
                return None;
            }

            match self.events_rx.recv().await {
                Some(event) => self.translate(event),
                None => {
                    // Driver gone without a close notification.
                    if self.destroyed {
                        return None;
                    }
                    self.destroy(None);
                }
            }
        }
    }

    fn translate(&mut self, event: DriverEvent) {
        if self.destroyed {
            return;
        }

        match event {
            DriverEvent::Open => {
                self.connecting = false;
                self.out.push_back(Event::Connect);
            }
            DriverEvent::Data(bytes) => {
                let data = match self.encoding {
                    Some(encoding) => Data::Text(encoding.encode(&bytes)),
                    None => Data::Binary(bytes),
                };
                self.out.push_back(Event::Data(data));
            }
            DriverEvent::Drain => {
                self.shared.buffer_size.store(0, Ordering::Relaxed);
                self.out.push_back(Event::Drain);
            }
            DriverEvent::Error(err) => {
                self.out.push_back(Event::Error(err));
            }
            DriverEvent::Closed { code, reason } => {
                let code = CloseCode::from_u16(code);
                if code.is_normal() {
                    self.destroy(None);
                } else {
                    let reason = if reason.is_empty() {
                        "Unknown reason".to_string()
                    } else {
                        reason
                    };
                    self.destroy(Some(Error::Closed { code, reason }));
                }
            }
        }
    }

    /// Write bytes to the peer.
    ///
    /// Returns the advisory backpressure verdict: `true` means "keep
    /// writing", `false` means queued output passed the high-water mark
    /// and the caller should wait for `Drain`. Nothing enforces the
    /// verdict; ignoring it only grows [`Socket::buffer_size`].
    ///
    /// A socket with no bound handle treats the write as a silent no-op
    /// success. The flush itself completes asynchronously in the driver.
    pub fn write(&mut self, data: impl Into<Bytes>) -> bool {
        let Some(handle) = &self.handle else {
            return true;
        };

        let data = data.into();
        let len = data.len() as u64;
        self.shared.bytes_written.fetch_add(len, Ordering::Relaxed);

        match handle.kind {
            BackendKind::Message => {
                let _ = handle.cmd.send(Command::Send(data));
                true
            }
            BackendKind::Stream => {
                let pending = self.shared.pending.fetch_add(len, Ordering::Relaxed) + len;
                // Flag before queueing, so the driver cannot flush the
                // payload and miss the drain signal.
                let backpressured = pending > self.shared.high_water;
                if backpressured {
                    self.shared.backpressured.store(true, Ordering::Relaxed);
                    self.shared.buffer_size.fetch_add(len, Ordering::Relaxed);
                }
                let _ = handle.cmd.send(Command::Send(data));
                !backpressured
            }
        }
    }

    /// Write text converted to bytes in the given encoding.
    ///
    /// # Errors
    ///
    /// Fails when the text is not valid in the chosen encoding; nothing
    /// is written in that case.
    pub fn write_str(&mut self, text: &str, encoding: Encoding) -> Result<bool> {
        let data = encoding.decode(text)?;
        Ok(self.write(data))
    }

    /// Optionally write a final payload, then destroy the socket.
    pub fn end(&mut self, data: Option<Bytes>) -> &mut Self {
        if let Some(data) = data {
            self.write(data);
        }
        self.destroy(None)
    }

    /// Stop reading from the backend. No-op for message-only backends.
    pub fn pause(&mut self) -> &mut Self {
        if let Some(handle) = &self.handle {
            if handle.kind == BackendKind::Stream {
                let _ = handle.cmd.send(Command::Pause);
            }
        }
        self
    }

    /// Resume reading from the backend. No-op for message-only backends.
    pub fn resume(&mut self) -> &mut Self {
        if let Some(handle) = &self.handle {
            if handle.kind == BackendKind::Stream {
                let _ = handle.cmd.send(Command::Resume);
            }
        }
        self
    }

    /// Destroy the socket, optionally reporting an error first.
    ///
    /// Idempotent: once the handle is cleared this is a no-op. The
    /// backend handle is closed and dropped, the destroyed flag set, and
    /// the terminal `Close` event queued, preceded by `Error` when one
    /// was supplied. `Close` is always the final event.
    pub fn destroy(&mut self, err: Option<Error>) -> &mut Self {
        let Some(handle) = self.handle.take() else {
            return self;
        };

        let _ = handle.cmd.send(Command::Close);
        self.destroyed = true;
        self.connecting = false;
        self.readable = false;
        self.writable = false;
        self.guard = None;

        if let Some(err) = err {
            self.out.push_back(Event::Error(err));
        }
        self.out.push_back(Event::Close);
        self
    }

    /// Set or clear the text encoding applied to future data events.
    pub fn set_encoding(&mut self, encoding: Option<Encoding>) -> &mut Self {
        self.encoding = encoding;
        self
    }

    /// Set the per-message frame limit and recompute the derived base64
    /// limit. Takes effect for frames that arrive after the call.
    ///
    /// # Panics
    ///
    /// Panics if `size` does not fit in 32 bits.
    pub fn set_max_frame(&mut self, size: usize) -> &mut Self {
        assert!(size <= u32::MAX as usize, "max frame must fit in 32 bits");
        self.shared.max_frame.store(size, Ordering::Relaxed);
        self.shared
            .max_base64
            .store(max_base64_len(size), Ordering::Relaxed);
        self
    }

    /// Remote addressing snapshot.
    #[must_use]
    pub fn address(&self) -> AddrInfo {
        AddrInfo {
            address: self.remote_address.clone(),
            family: self.remote_family,
            port: self.remote_port,
        }
    }

    /// Accepted for API parity; keep-alive is owned by the backend.
    pub fn set_keep_alive(&mut self, _enable: bool, _delay_ms: u64) -> &mut Self {
        self
    }

    /// Accepted for API parity; Nagle control is owned by the backend.
    pub fn set_no_delay(&mut self, _enable: bool) -> &mut Self {
        self
    }

    /// Accepted for API parity; no timeout is implemented at this layer.
    pub fn set_timeout(&mut self, _timeout_ms: u64) -> &mut Self {
        self
    }

    /// Accepted for API parity.
    pub fn ref_(&mut self) -> &mut Self {
        self
    }

    /// Accepted for API parity.
    pub fn unref(&mut self) -> &mut Self {
        self
    }

    pub(crate) fn attach_guard(&mut self, guard: ConnGuard) {
        self.guard = Some(guard);
    }

    /// Whether a client dial is still in flight.
    #[must_use]
    pub fn connecting(&self) -> bool {
        self.connecting
    }

    /// Whether the socket has been destroyed.
    #[must_use]
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the socket is readable.
    #[must_use]
    pub fn readable(&self) -> bool {
        self.readable
    }

    /// Whether the socket is writable.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Whether the underlying transport is encrypted.
    #[must_use]
    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    /// The configured text encoding, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Local address.
    #[must_use]
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Local port.
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Remote address.
    #[must_use]
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Remote address family.
    #[must_use]
    pub fn remote_family(&self) -> Family {
        self.remote_family
    }

    /// Remote port.
    #[must_use]
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Total payload bytes received.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.shared.bytes_read.load(Ordering::Relaxed)
    }

    /// Total payload bytes written.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    /// Buffered output accumulated while backpressured.
    ///
    /// Reset to zero when `Drain` fires.
    #[must_use]
    pub fn buffer_size(&self) -> u64 {
        self.shared.buffer_size.load(Ordering::Relaxed)
    }

    /// Current per-message frame limit.
    #[must_use]
    pub fn max_frame(&self) -> usize {
        self.shared.max_frame.load(Ordering::Relaxed)
    }

    /// Current derived base64 text limit.
    #[must_use]
    pub fn max_base64(&self) -> usize {
        self.shared.max_base64.load(Ordering::Relaxed)
    }

    /// The backend capability profile, if a handle is bound.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.handle.as_ref().map(|handle| handle.kind)
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}
