//! The IAX engine.
//!
//! Owns every session, the scheduler and the transport. All work happens
//! on the caller's thread: [`Engine::inject`] feeds a datagram in,
//! [`Engine::poll`] drains due timers and jitter-buffer deliveries, and the
//! async [`Engine::get_event`] combines both with a wait on the transport.
//!
//! ```text
//!   application ──► call / accept / send_voice / ...
//!        ▲                    │
//!        │ Event              ▼
//!   ┌────┴───────────────────────────────────────────┐
//!   │ Engine                                         │
//!   │   SessionRegistry ── Session ── Jitterbuf      │
//!   │   Scheduler (retries, pings, events)           │
//!   └────┬───────────────────────────────────────────┘
//!        │ datagrams
//!        ▼
//!    Transport (IaxSocket | MemoryTransport)
//! ```

mod config;
mod dial;
mod poll;
mod receive;
mod send;
mod transfer;

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

pub use config::{EngineBuilder, EngineConfig};
pub use dial::DialString;
#[cfg(feature = "transport")]
pub use poll::Wait;
pub use send::CallRequest;
pub use transfer::TransferOptions;

use crate::core::timing::{MAX_RETRY_MS, MAX_TRANSFER_RETRY_MS, MIN_RETRY_MS};
use crate::core::{Clock, EngineError, EngineResult, MonotonicClock};
use crate::event::{CallNumber, Event, EventKind};
use crate::frame::{Command, Format, FrameType, FullHeader, MiniHeader, compress_subclass};
use crate::scheduler::{OutboundFrame, Scheduled, Scheduler, Timer};
use crate::session::{NetStats, Session, SessionRegistry, TxKind, WrappingCounter};
use crate::transport::Transport;

/// How a full frame is handed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Retransmitted until acknowledged.
    Reliable,
    /// Reliable, and the session closes with it.
    Final,
    /// Reliable, addressed to the transfer target.
    Transfer,
    /// Sent once, never retried.
    Immediate,
}

/// One frame on its way out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Outgoing<'a> {
    kind: FrameType,
    subclass: u32,
    payload: &'a [u8],
    ts: Option<u32>,
    seqno: Option<u8>,
    samples: u32,
}

impl<'a> Outgoing<'a> {
    pub(crate) fn new(kind: FrameType, subclass: u32, payload: &'a [u8]) -> Self {
        Self {
            kind,
            subclass,
            payload,
            ts: None,
            seqno: None,
            samples: 0,
        }
    }

    pub(crate) fn command(command: Command, ies: &'a [u8]) -> Self {
        Self::new(FrameType::Iax, command.subclass(), ies)
    }

    /// Use this timestamp instead of computing one.
    pub(crate) fn at(mut self, ts: u32) -> Self {
        self.ts = Some(ts);
        self
    }

    /// Use this outgoing sequence number and leave the session's alone.
    pub(crate) fn seqno(mut self, seqno: u8) -> Self {
        self.seqno = Some(seqno);
        self
    }

    pub(crate) fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

/// Requests an engine stop from another task.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Ask the engine to shut down at its next [`Engine::get_event`].
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a shutdown is pending.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[cfg(feature = "transport")]
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// An IAX endpoint multiplexing any number of call legs over one
/// transport.
pub struct Engine<T> {
    config: EngineConfig,
    transport: T,
    clock: Arc<dyn Clock>,
    sessions: SessionRegistry,
    scheduler: Scheduler,
    transfer_ids: WrappingCounter,
    shutdown: ShutdownHandle,
    recv_buf: Vec<u8>,
}

impl<T: Transport> Engine<T> {
    /// Create an engine over `transport`, timed by a monotonic clock.
    pub fn new(config: EngineConfig, transport: T) -> EngineResult<Self> {
        Self::with_clock(config, transport, Arc::new(MonotonicClock::new()))
    }

    /// Create an engine with an explicit clock.
    pub fn with_clock(
        config: EngineConfig,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let counter = match config.first_call_number {
            Some(first) => WrappingCounter::starting_at(first),
            None => WrappingCounter::random(),
        };
        Ok(Self {
            config,
            transport,
            clock,
            sessions: SessionRegistry::new(counter),
            scheduler: Scheduler::new(),
            transfer_ids: WrappingCounter::random(),
            shutdown: ShutdownHandle::default(),
            recv_buf: Vec::new(),
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Local address of the transport.
    pub fn local_addr(&self) -> EngineResult<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Current engine time in ms.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Create an idle outbound session.
    pub fn new_session(&mut self) -> EngineResult<CallNumber> {
        let call = self.create_session()?;
        debug!(call = %call, "session created");
        Ok(call)
    }

    /// Destroy a session and scrub everything scheduled for it.
    ///
    /// Returns `false` if no such session was live.
    pub fn destroy_session(&mut self, call: CallNumber) -> bool {
        self.scheduler.purge_session(call);
        let Some(mut session) = self.sessions.remove(call) else {
            return false;
        };
        let discarded = std::iter::from_fn(|| session.jitterbuf.drain()).count();
        debug!(call = %call, discarded, "session destroyed");
        true
    }

    /// A live session.
    pub fn session(&self, call: CallNumber) -> Option<&Session> {
        self.sessions.get(call)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Peer address of a session.
    pub fn peer_addr(&self, call: CallNumber) -> Option<SocketAddr> {
        self.sessions.get(call)?.peer_addr
    }

    /// Attach application data to a session.
    pub fn set_user_data(&mut self, call: CallNumber, data: Box<dyn Any + Send>) -> EngineResult<()> {
        self.sessions.require(call)?.set_user_data(data);
        Ok(())
    }

    /// Application data of a session, if present and of type `U`.
    pub fn user_data<U: Any>(&self, call: CallNumber) -> Option<&U> {
        self.sessions.get(call)?.user_data::<U>()
    }

    /// Round-trip time plus local and peer-reported network statistics.
    pub fn netstats(&mut self, call: CallNumber) -> EngineResult<NetStats> {
        let use_jb = self.config.use_jitterbuffer;
        let session = self.sessions.require(call)?;
        Ok(NetStats {
            rtt: session.ping_time,
            local: session.local_stats(use_jb),
            remote: session.remote_stats,
        })
    }

    /// Run `callback` once, `delay` from now, during a later poll.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let when = self.now_ms() + duration_ms(delay);
        self.scheduler
            .add(when, Scheduled::Timer(Timer::Callback(Box::new(callback))));
    }

    /// Handle for requesting a shutdown from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Ask [`get_event`](Self::get_event) to shut the engine down.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    /// Hang up every session and clear the scheduler.
    pub fn shutdown(&mut self) {
        let calls = self.sessions.call_numbers();
        debug!(sessions = calls.len(), "shutting down");
        for call in calls {
            if let Err(e) = self.hangup(call, Some("System Shutdown")) {
                debug!(call = %call, error = %e, "no hangup sent on shutdown");
            }
            self.destroy_session(call);
        }
        self.scheduler.clear();
    }

    pub(crate) fn create_session(&mut self) -> EngineResult<CallNumber> {
        let call = self.sessions.allocate()?;
        let mut session = Session::new(call, self.config.jitter);
        session.ping_time = self.config.default_ping_time_ms;
        self.sessions.insert(session);
        Ok(call)
    }

    pub(crate) fn schedule_ping(&mut self, call: CallNumber, delay: Duration) {
        let when = self.now_ms() + duration_ms(delay);
        self.scheduler.add(when, Scheduled::Timer(Timer::Ping(call)));
    }

    /// Stamp, encode and send one frame.
    ///
    /// Voice continuing the current format within the same 64 s timestamp
    /// window goes out as a mini frame. Everything else is a full frame,
    /// scheduled for retransmission unless immediate or an ACK.
    pub(crate) fn transmit(
        &mut self,
        call: CallNumber,
        out: Outgoing<'_>,
        delivery: Delivery,
    ) -> EngineResult<()> {
        let now = self.clock.now_ms();
        let session = self.sessions.require(call)?;
        if session.closing && delivery != Delivery::Immediate {
            return Err(EngineError::SessionClosing(call.get()));
        }
        let transfer = delivery == Delivery::Transfer;
        let addr = session
            .destination(transfer)
            .ok_or(EngineError::NoPeerAddress(call.get()))?;
        let csub = compress_subclass(out.subclass)?;

        let last_sent = session.tx.last_sent();
        let tx_kind = match out.kind {
            FrameType::Voice => TxKind::Voice {
                samples: out.samples,
            },
            FrameType::Iax | FrameType::Null => TxKind::Command,
            _ => TxKind::Other,
        };
        let ts = session.tx.stamp(now, out.ts, tx_kind);
        if ts == 0 {
            return Err(EngineError::ZeroTimestamp);
        }

        let format = Format(out.subclass);
        if out.kind == FrameType::Voice
            && ts & 0xFFFF_0000 == last_sent & 0xFFFF_0000
            && session.send_voice_format == Some(format)
        {
            let header = MiniHeader {
                call: call.get(),
                timestamp: ts as u16,
            };
            let mut data = header.to_bytes().to_vec();
            data.extend_from_slice(out.payload);
            trace!(call = %call, ts, len = data.len(), "mini frame");
            return xmit(&self.transport, &data, addr);
        }

        let oseqno = match out.seqno {
            Some(seqno) => seqno,
            None => {
                let seqno = session.oseqno;
                session.oseqno = seqno.wrapping_add(1);
                seqno
            }
        };
        let header = FullHeader {
            source_call: call.get(),
            dest_call: if transfer {
                session.transfer.call_number
            } else {
                session.peer_call_number
            },
            retransmit: false,
            timestamp: ts,
            oseqno,
            iseqno: if transfer { 0 } else { session.iseqno },
            frame_type: out.kind.as_byte(),
            csub,
        };
        if !transfer {
            session.aseqno = session.iseqno;
        }
        if out.kind == FrameType::Voice {
            session.send_voice_format = Some(format);
        }
        if delivery == Delivery::Final {
            session.closing = true;
        }

        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(out.payload);

        let is_ack = out.kind == FrameType::Iax && out.subclass == Command::Ack.subclass();
        if delivery != Delivery::Immediate && !is_ack {
            let ceiling = if transfer { MAX_TRANSFER_RETRY_MS } else { MAX_RETRY_MS };
            let interval = (session.ping_time.max(0) as u64 * 2).clamp(MIN_RETRY_MS, ceiling);
            self.scheduler.add(
                now + interval,
                Scheduled::Frame(OutboundFrame {
                    call,
                    data: data.clone(),
                    oseqno,
                    retries_left: self.config.max_retries,
                    retry_interval_ms: interval,
                    transfer,
                    final_frame: delivery == Delivery::Final,
                }),
            );
        }
        trace!(
            call = %call,
            seq = oseqno,
            ts,
            kind = ?out.kind,
            subclass = out.subclass,
            "full frame"
        );
        xmit(&self.transport, &data, addr)
    }

    /// Last look at an event before it reaches the application.
    ///
    /// Requests the engine answers itself are swallowed; hangups and
    /// rejects take the session with them.
    pub(crate) fn handle_event(&mut self, event: Event) -> Option<Event> {
        let call = event.call;
        if !self.sessions.contains(call) {
            trace!(call = %call, kind = ?event.kind, "event for destroyed session dropped");
            return None;
        }
        match event.kind {
            EventKind::LagRequest => {
                if let Err(e) = self.send_lag_reply(call, event.ts) {
                    warn!(call = %call, error = %e, "lag reply not sent");
                }
                None
            }
            EventKind::Ping => {
                if let Err(e) = self.send_pong(call, event.ts) {
                    warn!(call = %call, error = %e, "pong not sent");
                }
                None
            }
            EventKind::Poke => {
                if let Err(e) = self.send_pong(call, event.ts) {
                    warn!(call = %call, error = %e, "pong not sent");
                }
                self.destroy_session(call);
                None
            }
            EventKind::Hangup | EventKind::Reject => {
                self.destroy_session(call);
                Some(event)
            }
            _ => Some(event),
        }
    }
}

#[cfg(feature = "transport")]
impl Engine<crate::transport::IaxSocket> {
    /// Bind a UDP socket at `config.bind_addr` and build an engine on it.
    pub async fn bind(config: EngineConfig) -> EngineResult<Self> {
        let socket = crate::transport::IaxSocket::bind(config.bind_addr).await?;
        Self::new(config, socket)
    }
}

impl<T: fmt::Debug> fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("transport", &self.transport)
            .field("sessions", &self.sessions.len())
            .field("scheduled", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

/// Hand one datagram to the transport. A full send buffer is not an
/// error: reliable frames are retried by the scheduler.
fn xmit<T: Transport>(transport: &T, data: &[u8], to: SocketAddr) -> EngineResult<()> {
    match transport.send_to(data, to) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            trace!(%to, "send buffer full");
            Ok(())
        }
        Err(e) => {
            error!(%to, error = %e, "send failed");
            Err(e.into())
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Two-sided harness: an engine on a memory transport, a manual clock
    //! and a scripted remote peer.

    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;
    use crate::core::ManualClock;
    use crate::frame::{Header, Ies};
    use crate::transport::MemoryTransport;

    pub const LOCAL: &str = "127.0.0.1:4569";
    pub const PEER: &str = "10.0.0.2:4569";

    pub fn peer() -> SocketAddr {
        PEER.parse().unwrap()
    }

    pub fn engine_with(config: EngineConfig) -> (Engine<MemoryTransport>, ManualClock) {
        let clock = ManualClock::new(10_000);
        let transport = MemoryTransport::new(LOCAL.parse().unwrap());
        let engine = Engine::with_clock(config, transport, Arc::new(clock.clone())).unwrap();
        (engine, clock)
    }

    pub fn engine() -> (Engine<MemoryTransport>, ManualClock) {
        engine_with(EngineBuilder::new().first_call_number(1).build().unwrap())
    }

    /// Session already talking to [`peer`] as peer call number 7.
    pub fn connected(engine: &mut Engine<MemoryTransport>) -> CallNumber {
        let call = engine.new_session().unwrap();
        let session = engine.sessions.get_mut(call).unwrap();
        session.peer_addr = Some(peer());
        session.peer_call_number = 7;
        session.capability = Format::ULAW;
        call
    }

    /// Full frame as the peer would send it.
    pub struct PeerFrame {
        pub header: FullHeader,
        pub payload: Vec<u8>,
    }

    impl PeerFrame {
        pub fn new(kind: FrameType, subclass: u32, dest: CallNumber) -> Self {
            Self {
                header: FullHeader {
                    source_call: 7,
                    dest_call: dest.get(),
                    retransmit: false,
                    timestamp: 100,
                    oseqno: 0,
                    iseqno: 0,
                    frame_type: kind.as_byte(),
                    csub: compress_subclass(subclass).unwrap(),
                },
                payload: Vec::new(),
            }
        }

        pub fn command(command: Command, dest: CallNumber) -> Self {
            Self::new(FrameType::Iax, command.subclass(), dest)
        }

        pub fn seq(mut self, oseqno: u8, iseqno: u8) -> Self {
            self.header.oseqno = oseqno;
            self.header.iseqno = iseqno;
            self
        }

        pub fn ts(mut self, ts: u32) -> Self {
            self.header.timestamp = ts;
            self
        }

        pub fn source(mut self, source_call: u16) -> Self {
            self.header.source_call = source_call;
            self
        }

        pub fn payload(mut self, payload: Vec<u8>) -> Self {
            self.payload = payload;
            self
        }

        pub fn bytes(&self) -> Vec<u8> {
            let mut data = self.header.to_bytes().to_vec();
            data.extend_from_slice(&self.payload);
            data
        }
    }

    /// Decoded view of a datagram the engine sent.
    #[derive(Debug)]
    pub struct Sent {
        pub header: Header,
        pub payload: Vec<u8>,
        pub to: SocketAddr,
    }

    impl Sent {
        pub fn full(&self) -> &FullHeader {
            match &self.header {
                Header::Full(header) => header,
                Header::Mini(_) => panic!("expected a full frame, got {:?}", self.header),
            }
        }

        pub fn command(&self) -> Option<Command> {
            match &self.header {
                Header::Full(header) => header.command(),
                Header::Mini(_) => None,
            }
        }

        pub fn ies(&self) -> Ies {
            Ies::parse(&self.payload).unwrap()
        }
    }

    pub fn sent(engine: &Engine<MemoryTransport>) -> Vec<Sent> {
        engine
            .transport()
            .take_sent()
            .into_iter()
            .map(|datagram| {
                let (header, payload) = Header::parse(&datagram.data).unwrap();
                Sent {
                    header,
                    payload: payload.to_vec(),
                    to: datagram.addr,
                }
            })
            .collect()
    }

    pub fn sent_commands(engine: &Engine<MemoryTransport>) -> Vec<Command> {
        sent(engine).iter().filter_map(Sent::command).collect()
    }
}
