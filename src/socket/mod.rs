//! Socket adapter: one bidirectional byte stream over a WebSocket
//! connection.
//!
//! A [`Socket`] is created unconnected, then bound exactly once to a
//! backend handle, either by accepting an upgraded server-side stream or
//! by dialing out as a client. Once bound it yields an ordered stream of
//! [`Event`](crate::Event)s until the terminal `Close`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsock::{Event, Socket};
//!
//! let mut socket = Socket::new();
//! socket.connect(8080, None, false, &[]);
//!
//! while let Some(event) = socket.next_event().await {
//!     match event {
//!         Event::Connect => { socket.write(&b"hello"[..]); }
//!         Event::Data(data) => println!("got {} bytes", data.len()),
//!         Event::Error(err) => eprintln!("{err}"),
//!         Event::Close => break,
//!         _ => {}
//!     }
//! }
//! ```

mod driver;

#[allow(clippy::module_inception)]
mod socket;

pub use socket::{AddrInfo, BackendKind, Family, Peer, Socket};
