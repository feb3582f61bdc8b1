//! Events surfaced to the application, one per poll.

use std::fmt;

use crate::frame::Ies;

/// Local call number identifying a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallNumber(pub u16);

impl CallNumber {
    /// Raw value.
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Incoming call (NEW).
    Connect,
    /// Our call was accepted.
    Accept,
    /// Remote hangup.
    Hangup,
    /// Call or registration rejected.
    Reject,
    /// Voice payload; empty payload means "interpolate".
    Voice,
    /// DTMF digit in `subclass`.
    Dtmf,
    /// A reliable frame exhausted its retries.
    Timeout,
    /// Lag request received (answered internally).
    LagRequest,
    /// Lag reply; `ts` holds the measured lag.
    LagReply,
    /// Remote end is ringing.
    Ringing,
    /// Ping received (answered internally).
    Ping,
    /// Pong received.
    Pong,
    /// Remote end busy or congested.
    Busy,
    /// Remote end answered.
    Answer,
    /// Image payload; format in `subclass`.
    Image,
    /// Authentication requested by the peer.
    AuthRequest,
    /// Text payload.
    Text,
    /// Registration request or release.
    RegRequest,
    /// Registration acknowledged.
    RegAck,
    /// Registration rejected.
    RegReject,
    /// URL to load.
    Url,
    /// URL to load and track.
    LinkUrl,
    /// Peer finished loading a URL.
    LoadComplete,
    /// Call was transferred onto a new peer.
    Transfer,
    /// Dial plan reply.
    DialPlanReply,
    /// Comfort noise.
    Cng,
    /// Peer asked us to stop sending audio.
    Quelch,
    /// Peer asked us to resume audio.
    Unquelch,
    /// Peer dropped its HTML linkage.
    Unlink,
    /// Peer rejected a link request.
    LinkReject,
    /// Transfer handshake completed on this leg.
    TransferReady,
    /// Transfer was rejected.
    TransferReject,
    /// Poke received (answered internally).
    Poke,
}

/// One event for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Session the event belongs to.
    pub call: CallNumber,
    /// What happened.
    pub kind: EventKind,
    /// Subclass or format of the originating frame.
    pub subclass: u32,
    /// Frame timestamp (or derived value, see [`EventKind::LagReply`]).
    pub ts: u32,
    /// Raw payload for media and text events.
    pub payload: Vec<u8>,
    /// Information elements of command frames.
    pub ies: Ies,
}

impl Event {
    /// Create an event with no payload.
    pub fn new(call: CallNumber, kind: EventKind) -> Self {
        Self {
            call,
            kind,
            subclass: 0,
            ts: 0,
            payload: Vec::new(),
            ies: Ies::default(),
        }
    }

    /// Set the subclass.
    pub fn with_subclass(mut self, subclass: u32) -> Self {
        self.subclass = subclass;
        self
    }

    /// Set the timestamp.
    pub fn with_ts(mut self, ts: u32) -> Self {
        self.ts = ts;
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Set the information elements.
    pub fn with_ies(mut self, ies: Ies) -> Self {
        self.ies = ies;
        self
    }

    /// Text payload, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
