//! Per-socket driver tasks.
//!
//! Each bound socket owns one driver task. The driver owns the backend
//! stream, services write commands, polls incoming frames, enforces the
//! shared frame limits, and reports everything back over an unbounded
//! event channel. Events for one socket are produced by exactly one
//! task, which preserves strict per-socket ordering.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{WebSocketStream, connect_async_with_config};

use crate::error::Error;
use crate::payload::{Normal, decode_base64, normalize};
use crate::socket::socket::{BackendKind, Shared};

/// Commands a socket sends to its driver.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send a binary payload.
    Send(Bytes),
    /// Stop polling the read side.
    Pause,
    /// Resume polling the read side.
    Resume,
    /// Close the backend and exit.
    Close,
}

/// Events a driver reports to its socket.
#[derive(Debug)]
pub(crate) enum DriverEvent {
    /// Client handshake completed.
    Open,
    /// A normalized, size-checked payload.
    Data(Bytes),
    /// All queued output flushed after backpressure.
    Drain,
    /// A failure that does not by itself end the connection.
    Error(Error),
    /// The connection ended with the given close code.
    Closed { code: u16, reason: String },
}

/// Parameters for a client dial.
#[derive(Debug)]
pub(crate) struct Dial {
    pub(crate) url: String,
    pub(crate) protocols: Vec<String>,
    pub(crate) origin: String,
    pub(crate) user_agent: String,
    pub(crate) backend_max_frame: usize,
}

/// Spawn a driver for an already-established server-side stream.
pub(crate) fn spawn_stream<S>(
    ws: WebSocketStream<S>,
    kind: BackendKind,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<DriverEvent>,
) -> mpsc::UnboundedSender<Command>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(ws, kind, cmd_rx, shared, events));
    cmd_tx
}

/// Spawn a driver that dials out as a client, then services the stream.
///
/// Commands sent before the handshake completes are queued and serviced
/// once the connection is up. A failed dial reports a handshake error
/// followed by an abnormal closure.
pub(crate) fn spawn_client(
    dial: Dial,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<DriverEvent>,
) -> mpsc::UnboundedSender<Command> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut request = match dial.url.as_str().into_client_request() {
            Ok(request) => request,
            Err(err) => {
                let _ = events.send(DriverEvent::Error(Error::Handshake(err.to_string())));
                let _ = events.send(DriverEvent::Closed {
                    code: 1006,
                    reason: String::new(),
                });
                return;
            }
        };

        {
            let headers = request.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&dial.user_agent) {
                headers.insert("User-Agent", value);
            }
            // Spoof
            if let Ok(value) = HeaderValue::from_str(&dial.origin) {
                headers.insert("Origin", value);
            }
            if !dial.protocols.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&dial.protocols.join(", ")) {
                    headers.insert("Sec-WebSocket-Protocol", value);
                }
            }
        }

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(dial.backend_max_frame);
        config.max_frame_size = Some(dial.backend_max_frame);

        match connect_async_with_config(request, Some(config), false).await {
            Ok((ws, _response)) => {
                debug!("connected to {}", dial.url);
                let _ = events.send(DriverEvent::Open);
                run(ws, BackendKind::Stream, cmd_rx, shared, events).await;
            }
            Err(err) => {
                debug!("dial to {} failed: {err}", dial.url);
                let _ = events.send(DriverEvent::Error(Error::Handshake(err.to_string())));
                let _ = events.send(DriverEvent::Closed {
                    code: 1006,
                    reason: String::new(),
                });
            }
        }
    });

    cmd_tx
}

async fn run<S>(
    mut ws: WebSocketStream<S>,
    kind: BackendKind,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<DriverEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut paused = false;
    let mut close_seen = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(data)) => {
                    let len = data.len() as u64;
                    if let Err(err) = ws.send(Message::Binary(data)).await {
                        let _ = events.send(DriverEvent::Error(Error::Transport(err.to_string())));
                        let _ = events.send(DriverEvent::Closed {
                            code: 1006,
                            reason: String::new(),
                        });
                        break;
                    }
                    if kind == BackendKind::Stream {
                        let left = shared.pending.fetch_sub(len, Ordering::Relaxed) - len;
                        if left == 0 && shared.backpressured.swap(false, Ordering::Relaxed) {
                            let _ = events.send(DriverEvent::Drain);
                        }
                    }
                }
                Some(Command::Pause) => {
                    if kind == BackendKind::Stream {
                        paused = true;
                    }
                }
                Some(Command::Resume) => {
                    if kind == BackendKind::Stream {
                        paused = false;
                    }
                }
                // A dropped socket closes the backend the same way an
                // explicit destroy does.
                Some(Command::Close) | None => {
                    let frame = CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: Utf8Bytes::from_static(""),
                    };
                    let _ = ws.close(Some(frame)).await;
                    break;
                }
            },
            incoming = ws.next(), if !paused => match incoming {
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (1005, String::new()),
                    };
                    debug!("peer closed (code={code})");
                    let _ = events.send(DriverEvent::Closed { code, reason });
                    close_seen = true;
                    // Keep polling so the engine finishes the close
                    // handshake before the stream winds down.
                }
                Some(Ok(message)) => handle_message(message, &shared, &events),
                Some(Err(err)) => {
                    if !close_seen {
                        let _ = events.send(DriverEvent::Error(Error::Transport(err.to_string())));
                        let _ = events.send(DriverEvent::Closed {
                            code: 1006,
                            reason: String::new(),
                        });
                    }
                    break;
                }
                None => {
                    if !close_seen {
                        let _ = events.send(DriverEvent::Closed {
                            code: 1006,
                            reason: String::new(),
                        });
                    }
                    break;
                }
            },
        }
    }
}

/// Normalize one data-bearing frame, enforce the shared limits, and
/// deliver it. Failures become error events; the connection stays up.
fn handle_message(
    message: Message,
    shared: &Shared,
    events: &mpsc::UnboundedSender<DriverEvent>,
) {
    match normalize(message) {
        Err(err) => {
            let _ = events.send(DriverEvent::Error(err));
        }
        Ok(None) => {}
        Ok(Some(Normal::Text(text))) => {
            let max_base64 = shared.max_base64.load(Ordering::Relaxed);
            if text.len() > max_base64 {
                let _ = events.send(DriverEvent::Error(Error::Base64TooLarge {
                    len: text.len(),
                    max: max_base64,
                }));
                return;
            }
            match decode_base64(&text) {
                Ok(bytes) => deliver(bytes, shared, events),
                Err(err) => {
                    let _ = events.send(DriverEvent::Error(err));
                }
            }
        }
        Ok(Some(Normal::Binary(bytes))) => deliver(bytes, shared, events),
    }
}

fn deliver(bytes: Bytes, shared: &Shared, events: &mpsc::UnboundedSender<DriverEvent>) {
    let max_frame = shared.max_frame.load(Ordering::Relaxed);
    if bytes.len() > max_frame {
        let _ = events.send(DriverEvent::Error(Error::FrameTooLarge {
            len: bytes.len(),
            max: max_frame,
        }));
        return;
    }

    shared.bytes_read.fetch_add(bytes.len() as u64, Ordering::Relaxed);
    let _ = events.send(DriverEvent::Data(bytes));
}
