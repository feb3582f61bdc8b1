//! Datagram transport.
//!
//! The engine never touches a socket directly; it talks to a
//! [`Transport`]. Two implementations ship with the crate:
//!
//! - **[`IaxSocket`]**: tokio UDP socket (feature `transport`)
//! - **[`MemoryTransport`]**: in-process queue, for sockets owned by the
//!   application and for tests
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Engine                       │
//! │   sessions, scheduler, jitter buffers   │
//! ├─────────────────────────────────────────┤
//! │         Transport                       │  ← This module
//! │   send_to / try_recv_from / readable    │
//! ├─────────────────────────────────────────┤
//! │       UDP socket or memory queue        │
//! └─────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;

mod memory;
#[cfg(feature = "transport")]
mod socket;

pub use memory::{Datagram, MemoryTransport};
#[cfg(feature = "transport")]
pub use socket::IaxSocket;

/// Non-blocking datagram I/O used by the engine.
pub trait Transport: Send + Sync {
    /// Send one datagram without waiting. A full send buffer is reported
    /// as [`io::ErrorKind::WouldBlock`].
    fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram if one is waiting.
    ///
    /// Returns `Ok(None)` when nothing is available.
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Resolve once a datagram may be available.
    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// Local address, if bound.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}
