//! Tokio UDP socket transport.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::Transport;

/// UDP socket shared by every session of an engine.
#[derive(Debug, Clone)]
pub struct IaxSocket {
    socket: Arc<UdpSocket>,
}

impl IaxSocket {
    /// Bind to `addr`. If the port is taken, fall back to any free port on
    /// the same interface.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && addr.port() != 0 => {
                warn!(%addr, "preferred port in use, binding to a free one");
                UdpSocket::bind(SocketAddr::new(addr.ip(), 0)).await?
            }
            Err(e) => return Err(e),
        };
        let socket = Self::from_socket(socket);
        debug!(addr = ?socket.local_addr().ok(), "socket bound");
        Ok(socket)
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
        }
    }

    /// Underlying tokio socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Transport for IaxSocket {
    fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize> {
        self.socket.try_send_to(data, to)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send {
        self.socket.readable()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_socket_bind() {
        let socket = IaxSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() != 0);
    }

    #[tokio::test]
    async fn test_bind_falls_back_when_port_taken() {
        let first = IaxSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let second = IaxSocket::bind(taken).await.unwrap();
        let addr = second.local_addr().unwrap();
        assert_ne!(addr.port(), taken.port());
    }

    #[tokio::test]
    async fn test_socket_send_recv() {
        let server = IaxSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = IaxSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let data = b"hello IAX";
        client.send_to(data, server_addr).unwrap();

        server.readable().await.unwrap();
        let mut buf = [0u8; 64];
        let mut received = None;
        while received.is_none() {
            received = server.try_recv_from(&mut buf).unwrap();
            if received.is_none() {
                server.readable().await.unwrap();
            }
        }
        let (len, from) = received.unwrap();
        assert_eq!(&buf[..len], data);
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let socket = IaxSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let mut buf = [0u8; 16];
        assert!(socket.try_recv_from(&mut buf).unwrap().is_none());
    }
}
