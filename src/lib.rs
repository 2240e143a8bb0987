//! # wsock - TCP-style stream sockets over WebSocket transport
//!
//! `wsock` exposes WebSocket connections through the surface of a
//! conventional stream socket: connect/listen, byte-oriented data
//! events, advisory backpressure, and a single terminal close.
//!
//! ## Features
//!
//! - **Uniform socket surface** over dialed and accepted connections
//! - **Event-driven** with strict per-socket ordering
//! - **Base64 reinterpretation** of text frames for binary-less peers
//! - **Advisory backpressure** with drain signaling
//! - **Delegated protocol engine** - framing, masking and handshakes
//!   stay in `tokio-tungstenite`; HTTP stays in `hyper`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsock::{Event, Server, ServerEvent};
//!
//! // Listener side
//! let mut server = Server::new(None);
//! server.listen(8080, "127.0.0.1").await?;
//!
//! // Client side
//! let mut socket = wsock::connect(8080, None);
//! ```

pub mod close;
pub mod config;
pub mod error;
pub mod event;
pub mod payload;
pub mod server;
pub mod socket;

pub use close::CloseCode;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{Data, Event, ServerEvent};
pub use payload::Encoding;
pub use server::Server;
pub use socket::{AddrInfo, BackendKind, Family, Peer, Socket};

/// Create a socket and dial `host:port` over plain `ws://`.
///
/// The host defaults to the loopback address. Must be called within a
/// tokio runtime.
#[must_use]
pub fn connect(port: u16, host: Option<&str>) -> Socket {
    let mut socket = Socket::new();
    socket.connect(port, host, false, &[]);
    socket
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<CloseCode>();
        assert_send::<Encoding>();
        assert_send::<Event>();
        assert_send::<ServerEvent>();
        assert_send::<Socket>();
        assert_send::<Server>();
        assert_send::<Peer>();
        assert_send::<Family>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<CloseCode>();
        assert_sync::<Encoding>();
        assert_sync::<Peer>();
        assert_sync::<Family>();
    }
}
