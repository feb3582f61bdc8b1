//! Attended transfer.
//!
//! The engine bridging two legs asks both peers to talk to each other
//! directly. Each peer probes the other on the new path before either
//! side lets go of the old one:
//!
//! ```text
//!   PA                  engine (A, B)                  PB
//!    │ ◄──── TXREQ ──────── │ ──────── TXREQ ────────► │
//!    │ ─────────────── TXCNT ─────────────────────────► │
//!    │ ◄────────────── TXACC ────────────────────────── │
//!    │ ──── TXREADY ──────► │ ◄────── TXREADY ──────── │
//!    │ ◄──── TXREL ──────── │ ──────── TXREL ────────► │
//!    │ ◄══════════════ media, new path ═══════════════► │
//! ```
//!
//! A TXREJ from either side, or a probe running out of retries, unwinds
//! both legs back to the original path.

use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::core::{EngineError, EngineResult};
use crate::event::CallNumber;
use crate::frame::ie::tag;
use crate::frame::{Command, IeBuilder, Ies};
use crate::session::{TransferLink, TransferState};
use crate::transport::Transport;

use super::{Delivery, Engine, Outgoing};

/// How the bridging engine completes a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Keep our sequence numbers when each leg is released.
    pub preserve_sequence: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            preserve_sequence: true,
        }
    }
}

impl<T: Transport> Engine<T> {
    /// Ask the peers of `a` and `b` to connect to each other directly.
    pub fn setup_transfer(
        &mut self,
        a: CallNumber,
        b: CallNumber,
        options: TransferOptions,
    ) -> EngineResult<()> {
        let (a_addr, a_peer) = self.peer_of(a)?;
        let (b_addr, b_peer) = self.peer_of(b)?;
        let id = u32::from(self.transfer_ids.advance());
        debug!(a = %a, b = %b, id, "starting transfer");

        for (call, own_peer, partner, other_addr, other_peer) in
            [(a, a_peer, b, b_addr, b_peer), (b, b_peer, a, a_addr, a_peer)]
        {
            let session = self.sessions.require(call)?;
            session.transfer = TransferLink {
                state: TransferState::Begin,
                address: Some(other_addr),
                call_number: own_peer,
                id,
                partner: Some(partner),
                moh: session.transfer.moh,
                preserve_sequence: options.preserve_sequence,
            };
            let ies = IeBuilder::new()
                .addr(tag::APPARENT_ADDR, other_addr)?
                .short(tag::CALLNO, other_peer)?
                .int(tag::TRANSFERID, id)?
                .build();
            self.transmit(call, Outgoing::command(Command::TxReq, &ies), Delivery::Reliable)?;
        }
        Ok(())
    }

    fn peer_of(&mut self, call: CallNumber) -> EngineResult<(SocketAddr, u16)> {
        let session = self.sessions.require(call)?;
        let addr = session
            .peer_addr
            .ok_or(EngineError::NoPeerAddress(call.get()))?;
        Ok((addr, session.peer_call_number))
    }

    /// We are being transferred: probe the new peer.
    pub(crate) fn handle_txreq(&mut self, call: CallNumber, ies: &Ies) -> EngineResult<()> {
        let Some(target) = ies.apparent_addr else {
            debug!(call = %call, "transfer request without target address");
            return Ok(());
        };
        let session = self.sessions.require(call)?;
        session.send_voice_format = None;
        session.transfer.state = TransferState::Begin;
        session.transfer.address = Some(target);
        session.transfer.call_number = ies.callno.unwrap_or(0);
        session.transfer.id = ies.transfer_id.unwrap_or(0);
        debug!(call = %call, %target, id = session.transfer.id, "probing transfer target");

        let probe = IeBuilder::new()
            .int(tag::TRANSFERID, session.transfer.id)?
            .build();
        self.transmit(call, Outgoing::command(Command::TxCnt, &probe), Delivery::Transfer)
    }

    /// The transferred peer reached us on the new path.
    pub(crate) fn handle_txcnt(&mut self, call: CallNumber, from: SocketAddr) -> EngineResult<()> {
        let session = self.sessions.require(call)?;
        if !session.transfer.is_active() {
            debug!(call = %call, %from, "transfer probe outside a transfer");
            return Ok(());
        }
        session.transfer.address = Some(from);
        self.transmit(call, Outgoing::command(Command::TxAcc, &[]), Delivery::Transfer)
    }

    /// The new path works: tell the bridging engine.
    pub(crate) fn handle_txacc(&mut self, call: CallNumber) -> EngineResult<()> {
        let session = self.sessions.require(call)?;
        if !session.transfer.is_active() {
            return Ok(());
        }
        session.transfer.state = TransferState::Ready;
        let stopped = self.scheduler.cancel_transfer_frames(call);
        let ies = IeBuilder::new().short(tag::CALLNO, call.get())?.build();
        debug!(call = %call, stopped, "transfer path ready");
        self.transmit(call, Outgoing::command(Command::TxReady, &ies), Delivery::Reliable)
    }

    /// One leg reports its new path verified. Once both legs have, release
    /// them onto each other.
    ///
    /// Returns whether the pair was released.
    pub(crate) fn handle_txready(&mut self, call: CallNumber) -> EngineResult<bool> {
        let session = self.sessions.require(call)?;
        if !session.transfer.is_active() {
            debug!(call = %call, "transfer ready outside a transfer");
            return Ok(false);
        }
        session.transfer.state = TransferState::Ready;
        let moh = std::mem::take(&mut session.transfer.moh);
        let partner = session.transfer.partner;
        if moh {
            self.unquelch(call)?;
        }

        let Some(partner) = partner else {
            return Ok(false);
        };
        let Some(other) = self.sessions.get(partner) else {
            return Ok(false);
        };
        if other.transfer.partner != Some(call) || other.transfer.state != TransferState::Ready {
            return Ok(false);
        }

        let (own_addr, own_peer) = self.peer_of(call)?;
        let (other_addr, other_peer) = self.peer_of(partner)?;
        debug!(a = %call, b = %partner, "releasing transfer");
        self.finish_transfer(call, other_peer, other_addr)?;
        self.finish_transfer(partner, own_peer, own_addr)?;
        Ok(true)
    }

    fn finish_transfer(
        &mut self,
        call: CallNumber,
        new_peer: u16,
        new_addr: SocketAddr,
    ) -> EngineResult<()> {
        let preserve = self.sessions.require(call)?.transfer.preserve_sequence;
        let ies = IeBuilder::new().short(tag::CALLNO, new_peer)?.build();
        self.transmit(call, Outgoing::command(Command::TxRel, &ies), Delivery::Immediate)?;
        self.complete_transfer(call, new_peer, Some(new_addr), preserve);
        if let Some(session) = self.sessions.get_mut(call) {
            session.transfer.state = TransferState::Released;
        }
        Ok(())
    }

    /// The bridging engine released us onto the new peer.
    pub(crate) fn handle_txrel(&mut self, call: CallNumber, ies: &Ies) {
        let Some(session) = self.sessions.get(call) else {
            return;
        };
        if session.transfer.is_active() {
            let peer = ies.callno.unwrap_or(session.transfer.call_number);
            let addr = session.transfer.address;
            self.complete_transfer(call, peer, addr, false);
        } else {
            let peer = session.peer_call_number;
            self.complete_transfer(call, peer, None, true);
        }
    }

    /// Unwind a transfer on `call` and on its partner leg, if any.
    pub(crate) fn handle_txreject(&mut self, call: CallNumber) {
        let partner = self.sessions.get(call).and_then(|s| s.transfer.partner);
        for leg in partner.into_iter().chain(std::iter::once(call)) {
            self.unwind_transfer(leg);
        }
    }

    fn unwind_transfer(&mut self, call: CallNumber) {
        let Some(session) = self.sessions.get_mut(call) else {
            return;
        };
        if !session.transfer.is_active() {
            return;
        }
        let moh = session.transfer.moh;
        session.transfer = TransferLink::default();
        debug!(call = %call, "transfer abandoned");
        if moh {
            if let Err(e) = self.unquelch(call) {
                warn!(call = %call, error = %e, "unquelch after transfer failed");
            }
        }
    }

    /// Give up on a transfer whose new path never answered.
    pub(crate) fn abandon_transfer(&mut self, call: CallNumber) {
        let Some(session) = self.sessions.get(call) else {
            return;
        };
        if !session.transfer.is_active() {
            return;
        }
        let id = session.transfer.id;
        let sent = IeBuilder::new()
            .int(tag::TRANSFERID, id)
            .map_err(EngineError::from)
            .and_then(|ies| {
                self.transmit(call, Outgoing::command(Command::TxRej, &ies.build()), Delivery::Reliable)
            });
        if let Err(e) = sent {
            warn!(call = %call, error = %e, "transfer reject not sent");
        }
        self.handle_txreject(call);
    }

    /// Switch `call` over to `peer_call`, at `new_addr` when given, and
    /// start its timing and buffering afresh.
    fn complete_transfer(
        &mut self,
        call: CallNumber,
        peer_call: u16,
        new_addr: Option<SocketAddr>,
        preserve_sequence: bool,
    ) {
        let default_ping = self.config.default_ping_time_ms;
        let Some(session) = self.sessions.get_mut(call) else {
            return;
        };
        if let Some(addr) = new_addr {
            session.peer_addr = Some(addr);
            session.voice_format = None;
            session.send_voice_format = None;
        }
        session.transfer = TransferLink::default();
        session.peer_call_number = peer_call;
        session.tx.reset();
        session.rx.reset();
        let discarded = std::iter::from_fn(|| session.jitterbuf.drain()).count();
        session.jitterbuf.reset();
        session.lag.reset();
        if !preserve_sequence {
            session.reset_sequence();
        }
        session.ping_time = default_ping;
        debug!(
            call = %call,
            peer = peer_call,
            addr = ?session.peer_addr,
            discarded,
            preserve_sequence,
            "transfer complete"
        );
        self.scheduler.cancel_frames(call);
    }
}
