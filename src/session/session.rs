//! One call leg.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;

use crate::core::timing::DEFAULT_PING_TIME_MS;
use crate::event::{CallNumber, Event};
use crate::frame::{CodecPrefs, Format};
use crate::jitter::{DelayHistory, JitterConfig, Jitterbuf};

use super::timing::{RecvTiming, SendTiming};

/// Lag history used when the jitter buffer is bypassed: 1000 samples, the
/// top three trimmed.
pub type LagHistory = DelayHistory<1000, 4>;

/// Attended transfer progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// No transfer in progress.
    #[default]
    None,
    /// Transfer requested; probing the new path.
    Begin,
    /// New path verified.
    Ready,
    /// Transfer released onto the new path.
    Released,
}

/// Transfer bookkeeping of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferLink {
    /// Current state.
    pub state: TransferState,
    /// Address of the transfer target.
    pub address: Option<SocketAddr>,
    /// Call number the target knows us by.
    pub call_number: u16,
    /// Transfer id shared by both legs.
    pub id: u32,
    /// The other leg, when this engine initiated the transfer.
    pub partner: Option<CallNumber>,
    /// Whether music-on-hold quelch must be lifted when the transfer ends.
    pub moh: bool,
    /// Keep sequence numbers when the transfer completes.
    pub preserve_sequence: bool,
}

impl TransferLink {
    /// Whether any transfer is in flight.
    pub fn is_active(&self) -> bool {
        self.state != TransferState::None
    }
}

/// Network quality figures, either measured locally or reported by the
/// peer in a PONG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStat {
    /// Jitter estimate in ms.
    pub jitter: i64,
    /// Loss in percent.
    pub losspct: i64,
    /// Frames lost.
    pub losscnt: i64,
    /// Frames received.
    pub packets: i64,
    /// Current playout delay above the minimum, in ms.
    pub delay: i64,
    /// Frames dropped.
    pub dropped: i64,
    /// Frames received out of order.
    pub ooo: i64,
}

/// Round-trip time and both directions' network statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    /// Smoothed round-trip time in ms.
    pub rtt: i64,
    /// What we measured.
    pub local: NetStat,
    /// What the peer last reported.
    pub remote: NetStat,
}

/// Authentication and registration details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// User or peer name.
    pub username: Option<String>,
    /// Shared secret.
    pub secret: Option<String>,
    /// Registration refresh in seconds.
    pub refresh: u16,
}

/// One call leg.
pub struct Session {
    /// Our call number.
    pub call_number: CallNumber,
    /// The peer's call number (0 until learned).
    pub peer_call_number: u16,
    /// Primary peer address.
    pub peer_addr: Option<SocketAddr>,

    /// Next outgoing sequence number to assign.
    pub oseqno: u8,
    /// Next expected incoming sequence number.
    pub iseqno: u8,
    /// Highest of our sequence numbers acknowledged by the peer.
    pub rseqno: u8,
    /// Last incoming sequence number we acknowledged.
    pub aseqno: u8,

    /// Last voice format received.
    pub voice_format: Option<Format>,
    /// Last voice format sent.
    pub send_voice_format: Option<Format>,
    /// Formats we can receive.
    pub capability: Format,
    /// Peer's capability, from NEW.
    pub peer_capability: Format,
    /// Codec preference order.
    pub codec_prefs: CodecPrefs,

    /// Send-side timestamp state.
    pub tx: SendTiming,
    /// Receive-side timestamp state.
    pub rx: RecvTiming,
    /// Smoothed round-trip time estimate in ms.
    pub ping_time: i64,

    /// Playout buffer of decoded events.
    pub jitterbuf: Jitterbuf<Event>,
    /// Delay history used with the jitter buffer disabled.
    pub lag: LagHistory,
    /// Peer's last receiver report.
    pub remote_stats: NetStat,

    /// Transfer bookkeeping.
    pub transfer: TransferLink,
    /// Whether the peer asked us to stop sending audio.
    pub quelch: bool,
    /// Authentication details.
    pub credentials: Credentials,

    /// A closing frame is in flight; destroy once it is acknowledged.
    pub closing: bool,

    user_data: Option<Box<dyn Any + Send>>,
}

impl Session {
    /// Create an idle session.
    pub fn new(call_number: CallNumber, jitter: JitterConfig) -> Self {
        Self {
            call_number,
            peer_call_number: 0,
            peer_addr: None,
            oseqno: 0,
            iseqno: 0,
            rseqno: 0,
            aseqno: 0,
            voice_format: None,
            send_voice_format: None,
            capability: Format::default(),
            peer_capability: Format::default(),
            codec_prefs: CodecPrefs::new(),
            tx: SendTiming::default(),
            rx: RecvTiming::default(),
            ping_time: DEFAULT_PING_TIME_MS,
            jitterbuf: Jitterbuf::new(jitter),
            lag: LagHistory::new(),
            remote_stats: NetStat::default(),
            transfer: TransferLink::default(),
            quelch: false,
            credentials: Credentials::default(),
            closing: false,
            user_data: None,
        }
    }

    /// Attach opaque application data.
    pub fn set_user_data(&mut self, data: Box<dyn Any + Send>) {
        self.user_data = Some(data);
    }

    /// Application data, if present and of type `U`.
    pub fn user_data<U: Any>(&self) -> Option<&U> {
        self.user_data.as_ref()?.downcast_ref::<U>()
    }

    /// Remove and return application data.
    pub fn take_user_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.user_data.take()
    }

    /// Address frames for this session go to.
    pub fn destination(&self, transfer: bool) -> Option<SocketAddr> {
        if transfer {
            self.transfer.address
        } else {
            self.peer_addr
        }
    }

    /// Network statistics as seen from this side.
    pub fn local_stats(&mut self, use_jitterbuffer: bool) -> NetStat {
        if !use_jitterbuffer {
            let (_, jitter) = self.lag.stats();
            return NetStat {
                jitter,
                packets: self.lag.len() as i64,
                ..NetStat::default()
            };
        }
        let info = self.jitterbuf.info();
        NetStat {
            jitter: info.jitter,
            losspct: info.losspct / 1000,
            losscnt: info.frames_lost,
            packets: info.frames_in,
            delay: info.current - info.min,
            dropped: info.frames_dropped,
            ooo: info.frames_ooo,
        }
    }

    /// Forget sequence numbers.
    pub fn reset_sequence(&mut self) {
        self.oseqno = 0;
        self.iseqno = 0;
        self.rseqno = 0;
        self.aseqno = 0;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("call_number", &self.call_number)
            .field("peer_call_number", &self.peer_call_number)
            .field("peer_addr", &self.peer_addr)
            .field("oseqno", &self.oseqno)
            .field("iseqno", &self.iseqno)
            .field("rseqno", &self.rseqno)
            .field("aseqno", &self.aseqno)
            .field("transfer", &self.transfer)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}
