//! In-process transport.
//!
//! Datagrams the engine sends are recorded for the owner to forward (or
//! inspect); datagrams the owner pushes are handed to the engine on its
//! next read.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Mutex, PoisonError};

use super::Transport;

/// One recorded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Raw bytes.
    pub data: Vec<u8>,
    /// Destination (outbound) or source (inbound).
    pub addr: SocketAddr,
}

/// Transport backed by two in-memory queues.
#[derive(Debug)]
pub struct MemoryTransport {
    local: SocketAddr,
    sent: Mutex<Vec<Datagram>>,
    inbound: Mutex<VecDeque<Datagram>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, crate::core::DEFAULT_PORT)))
    }
}

impl MemoryTransport {
    /// Transport reporting `local` as its address.
    pub fn new(local: SocketAddr) -> Self {
        Self {
            local,
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a datagram for the engine to read.
    pub fn push_inbound(&self, data: &[u8], from: SocketAddr) {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Datagram {
                data: data.to_vec(),
                addr: from,
            });
    }

    /// Take every datagram sent so far.
    pub fn take_sent(&self) -> Vec<Datagram> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of datagrams sent and not yet taken.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn has_inbound(&self) -> bool {
        !self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Transport for MemoryTransport {
    fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Datagram {
                data: data.to_vec(),
                addr: to,
            });
        Ok(data.len())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some(datagram) = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        else {
            return Ok(None);
        };
        let len = datagram.data.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram.data[..len]);
        Ok(Some((len, datagram.addr)))
    }

    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send {
        let ready = self.has_inbound();
        async move {
            if !ready {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}
