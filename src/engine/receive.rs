//! Inbound path: datagram to session to event.
//!
//! Every full frame passes the acknowledgement window and the sequence
//! check before it is turned into an event. Media and most signalling is
//! then paced through the session's jitter buffer; a few requests are
//! answered on the spot.

use std::net::SocketAddr;

use tracing::{debug, error, trace, warn};

use crate::core::{EngineError, EngineResult, control, html};
use crate::event::{CallNumber, Event, EventKind};
use crate::frame::sizes::MAX_DATAGRAM_SIZE;
use crate::frame::{
    CodecPrefs, Command, Format, FrameType, FullHeader, Header, Ies, MiniHeader, mark_retransmit,
};
use crate::jitter::{FrameKind, PutResult};
use crate::scheduler::Scheduled;
use crate::session::{NetStat, TxKind};
use crate::transport::Transport;

use super::{Engine, xmit};

/// What becomes of an inbound frame once processed.
enum Outcome {
    /// Paced through the jitter buffer (or the scheduler).
    Buffer(Event),
    /// Surfaced right away.
    Immediate(Event),
    /// Nothing for the application.
    Handled,
}

impl<T: Transport> Engine<T> {
    /// Process one datagram received outside the engine.
    ///
    /// Returns an event only for frames surfaced immediately; everything
    /// else comes out of [`poll`](Self::poll). Malformed datagrams are
    /// logged and dropped.
    pub fn inject(&mut self, data: &[u8], from: SocketAddr) -> EngineResult<Option<Event>> {
        let (header, payload) = match Header::parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(%from, len = data.len(), error = %e, "discarding malformed datagram");
                return Ok(None);
            }
        };
        match header {
            Header::Full(header) => self.receive_full(&header, payload, from),
            Header::Mini(header) => {
                self.receive_mini(&header, payload, from);
                Ok(None)
            }
        }
    }

    /// Read waiting datagrams from the transport until one yields an
    /// event or none is left.
    pub fn receive(&mut self) -> EngineResult<Option<Event>> {
        let mut buf = std::mem::take(&mut self.recv_buf);
        buf.resize(MAX_DATAGRAM_SIZE, 0);
        let result = loop {
            match self.transport.try_recv_from(&mut buf) {
                Ok(Some((len, from))) => match self.inject(&buf[..len], from) {
                    Ok(Some(event)) => break Ok(Some(event)),
                    Ok(None) => {}
                    Err(e) => debug!(%from, error = %e, "datagram not fully processed"),
                },
                Ok(None) => break Ok(None),
                Err(e) => {
                    let e = EngineError::from(e);
                    if e.is_transient() {
                        break Ok(None);
                    }
                    error!(error = %e, "receive failed");
                    break Err(e);
                }
            }
        };
        self.recv_buf = buf;
        result
    }

    fn receive_full(
        &mut self,
        header: &FullHeader,
        payload: &[u8],
        from: SocketAddr,
    ) -> EngineResult<Option<Event>> {
        let command = header.command();
        let call = match self.sessions.find(from, header.source_call, header.dest_call) {
            Some(call) => call,
            None if header.dest_call == 0 && command.is_some_and(Command::creates_session) => {
                self.accept_session(header.source_call, from)?
            }
            None => {
                let probe = match command {
                    Some(Command::TxCnt) => Ies::parse(payload)
                        .ok()
                        .and_then(|ies| ies.transfer_id)
                        .filter(|id| *id != 0),
                    _ => None,
                };
                let found = probe.and_then(|id| {
                    self.sessions
                        .find_transfer_probe(from, header.source_call, header.dest_call, id)
                });
                match found {
                    Some(call) => call,
                    None => {
                        debug!(
                            %from,
                            source = header.source_call,
                            dest = header.dest_call,
                            ?command,
                            "no session for frame"
                        );
                        return Ok(None);
                    }
                }
            }
        };
        self.process_full(call, header, payload, from)
    }

    fn accept_session(&mut self, peer_call: u16, from: SocketAddr) -> EngineResult<CallNumber> {
        let call = self.create_session()?;
        let session = self.sessions.require(call)?;
        session.peer_call_number = peer_call;
        session.peer_addr = Some(from);
        let first_ping = self.config.first_ping_delay;
        self.schedule_ping(call, first_ping);
        debug!(call = %call, %from, peer = peer_call, "inbound session");
        Ok(call)
    }

    fn process_full(
        &mut self,
        call: CallNumber,
        header: &FullHeader,
        payload: &[u8],
        from: SocketAddr,
    ) -> EngineResult<Option<Event>> {
        let kind = header.kind();
        let command = header.command();
        let ts = header.timestamp;
        let iax = kind == Some(FrameType::Iax);

        let session = self.sessions.require(call)?;
        if iax && !matches!(command, Some(Command::Ack | Command::Pong | Command::LagRp)) {
            session.rx.observe(ts);
        }

        // acknowledgement window
        if session.peer_addr == Some(from) && command != Some(Command::Inval) {
            let outstanding = session.oseqno.wrapping_sub(session.rseqno);
            if header.iseqno.wrapping_sub(session.rseqno) <= outstanding {
                let acked = self.scheduler.acknowledge(call, session.rseqno, header.iseqno);
                if acked > 0 {
                    trace!(call = %call, acked, upto = header.iseqno, "frames acknowledged");
                }
                session.rseqno = header.iseqno;
            } else {
                debug!(
                    call = %call,
                    ack = header.iseqno,
                    rseqno = session.rseqno,
                    oseqno = session.oseqno,
                    "ack outside window ignored"
                );
            }
        }

        let exempt = iax
            && command.is_some_and(|c| {
                c.is_unsequenced() || (session.iseqno == 0 && c.is_transfer_handshake())
            });
        if session.iseqno != header.oseqno {
            if !exempt {
                let behind = session.iseqno.wrapping_sub(header.oseqno) < 128;
                debug!(
                    call = %call,
                    expected = session.iseqno,
                    seq = header.oseqno,
                    behind,
                    "frame out of sequence"
                );
                if behind {
                    self.send_ack(call, ts, header.iseqno)?;
                } else {
                    self.send_vnak(call)?;
                }
                return Ok(None);
            }
        } else if !(iax && command.is_some_and(Command::is_unsequenced)) {
            session.iseqno = session.iseqno.wrapping_add(1);
        }

        let subclass = header.subclass();
        let event = |kind| Event::new(call, kind).with_subclass(subclass).with_ts(ts);
        let outcome = match kind {
            Some(FrameType::Dtmf) => Outcome::Immediate(event(EventKind::Dtmf)),
            Some(FrameType::Voice) => {
                session.voice_format = Some(Format(subclass));
                Outcome::Buffer(event(EventKind::Voice).with_payload(payload))
            }
            Some(FrameType::Cng) => Outcome::Buffer(event(EventKind::Cng).with_payload(payload)),
            Some(FrameType::Iax) => match Ies::parse(payload) {
                Ok(ies) => self.process_command(call, header, command, ies, from)?,
                Err(e) => {
                    warn!(call = %call, ?command, error = %e, "discarding command with malformed elements");
                    Outcome::Handled
                }
            },
            Some(FrameType::Control) => match subclass {
                control::ANSWER => Outcome::Buffer(event(EventKind::Answer)),
                control::BUSY | control::CONGESTION => Outcome::Buffer(event(EventKind::Busy)),
                control::RINGING => Outcome::Buffer(event(EventKind::Ringing)),
                other => {
                    trace!(call = %call, subclass = other, "control frame ignored");
                    Outcome::Handled
                }
            },
            Some(FrameType::Image) => {
                Outcome::Buffer(event(EventKind::Image).with_payload(payload))
            }
            Some(FrameType::Text) => {
                let text = payload.strip_suffix(&[0]).unwrap_or(payload);
                Outcome::Buffer(event(EventKind::Text).with_payload(text))
            }
            Some(FrameType::Html) => match subclass {
                html::LINKURL => Outcome::Buffer(event(EventKind::LinkUrl).with_payload(payload)),
                html::URL => Outcome::Buffer(event(EventKind::Url).with_payload(payload)),
                html::LDCOMPLETE => Outcome::Buffer(event(EventKind::LoadComplete)),
                html::UNLINK => Outcome::Buffer(event(EventKind::Unlink)),
                html::LINKREJECT => Outcome::Buffer(event(EventKind::LinkReject)),
                other => {
                    trace!(call = %call, subclass = other, "html frame ignored");
                    Outcome::Handled
                }
            },
            Some(FrameType::Video | FrameType::Null) | None => {
                trace!(call = %call, frame_type = header.frame_type, "frame ignored");
                Outcome::Handled
            }
        };

        // acknowledge anything not already covered by a piggy-backed ack
        if let Some(session) = self.sessions.get(call) {
            if session.aseqno != session.iseqno {
                self.send_ack(call, ts, header.iseqno)?;
            }
        }

        Ok(match outcome {
            Outcome::Buffer(event) => {
                let update_history = !header.retransmit && kind == Some(FrameType::Voice);
                self.schedule_delivery(event, update_history);
                None
            }
            Outcome::Immediate(event) => self.handle_event(event),
            Outcome::Handled => None,
        })
    }

    fn process_command(
        &mut self,
        call: CallNumber,
        header: &FullHeader,
        command: Option<Command>,
        ies: Ies,
        from: SocketAddr,
    ) -> EngineResult<Outcome> {
        let ts = header.timestamp;
        let subclass = header.subclass();
        let event = |kind| Event::new(call, kind).with_subclass(subclass).with_ts(ts);
        let Some(command) = command else {
            debug!(call = %call, subclass, "unknown command ignored");
            return Ok(Outcome::Handled);
        };

        let outcome = match command {
            Command::New => {
                let session = self.sessions.require(call)?;
                session.peer_capability = Format(ies.capability.unwrap_or(0));
                if let Some(prefs) = ies.codec_prefs.as_deref() {
                    session.codec_prefs = CodecPrefs::from_wire(prefs);
                }
                Outcome::Buffer(event(EventKind::Connect).with_ies(ies))
            }
            Command::AuthReq => {
                let credentials = &self.sessions.require(call)?.credentials;
                let known_user = credentials.username.is_some() && credentials.username == ies.username;
                match credentials.secret.clone() {
                    Some(secret) if known_user => {
                        debug!(call = %call, "answering authentication request");
                        self.auth_reply(
                            call,
                            &secret,
                            ies.challenge.as_deref(),
                            ies.auth_methods.unwrap_or(0),
                        )?;
                        Outcome::Handled
                    }
                    _ => Outcome::Buffer(event(EventKind::AuthRequest).with_ies(ies)),
                }
            }
            Command::Hangup | Command::Inval => {
                Outcome::Buffer(event(EventKind::Hangup).with_ies(ies))
            }
            Command::Reject => Outcome::Buffer(event(EventKind::Reject).with_ies(ies)),
            Command::Ack => Outcome::Handled,
            Command::LagRq => Outcome::Buffer(event(EventKind::LagRequest)),
            Command::Poke => Outcome::Immediate(event(EventKind::Poke)),
            Command::Ping => Outcome::Immediate(event(EventKind::Ping)),
            Command::Pong => {
                let now = self.now_ms();
                let session = self.sessions.require(call)?;
                let now_ts = i64::from(session.tx.stamp(now, None, TxKind::Command));
                session.ping_time = (2 * session.ping_time + (now_ts - i64::from(ts))) / 3;
                let loss = ies.rr_loss.unwrap_or(0);
                session.remote_stats = NetStat {
                    jitter: i64::from(ies.rr_jitter.unwrap_or(0)),
                    losspct: i64::from(loss >> 24),
                    losscnt: i64::from(loss & 0x00ff_ffff),
                    packets: i64::from(ies.rr_packets.unwrap_or(0)),
                    delay: i64::from(ies.rr_delay.unwrap_or(0)),
                    dropped: i64::from(ies.rr_dropped.unwrap_or(0)),
                    ooo: i64::from(ies.rr_ooo.unwrap_or(0)),
                };
                trace!(call = %call, rtt = session.ping_time, "pong");
                Outcome::Immediate(event(EventKind::Pong).with_ies(ies))
            }
            Command::Accept => {
                let session = self.sessions.require(call)?;
                let format = Format(ies.format.unwrap_or(0));
                if format.intersects(session.capability) {
                    Outcome::Buffer(event(EventKind::Accept).with_ies(ies))
                } else {
                    debug!(call = %call, %format, capability = %session.capability, "no common codec");
                    self.reject(call, Some("Unable to negotiate codec"))?;
                    Outcome::Buffer(event(EventKind::Reject).with_ies(ies))
                }
            }
            Command::RegReq | Command::RegRel => {
                let credentials = &mut self.sessions.require(call)?.credentials;
                credentials.username = ies.username.clone();
                if let Some(refresh) = ies.refresh {
                    credentials.refresh = refresh;
                }
                Outcome::Buffer(event(EventKind::RegRequest).with_ies(ies))
            }
            Command::RegAck => Outcome::Buffer(event(EventKind::RegAck).with_ies(ies)),
            Command::RegRej => Outcome::Buffer(event(EventKind::RegReject).with_ies(ies)),
            Command::RegAuth => {
                debug!(call = %call, "answering registration challenge");
                self.regauth_reply(call, &ies)?;
                Outcome::Handled
            }
            Command::LagRp => {
                let now = self.now_ms();
                let use_jb = self.config.use_jitterbuffer;
                let session = self.sessions.require(call)?;
                let now_ts = session.tx.stamp(now, None, TxKind::Command);
                let jitter = session.local_stats(use_jb).jitter;
                Outcome::Immediate(
                    Event::new(call, EventKind::LagReply)
                        .with_ts(now_ts.wrapping_sub(ts))
                        .with_subclass(jitter.max(0) as u32),
                )
            }
            Command::TxReq => {
                self.handle_txreq(call, &ies)?;
                Outcome::Handled
            }
            Command::DpRep => Outcome::Immediate(event(EventKind::DialPlanReply).with_ies(ies)),
            Command::TxCnt => {
                self.handle_txcnt(call, from)?;
                Outcome::Handled
            }
            Command::TxAcc => {
                self.handle_txacc(call)?;
                Outcome::Handled
            }
            Command::TxRel => {
                self.send_ack(call, ts, header.iseqno)?;
                self.handle_txrel(call, &ies);
                Outcome::Buffer(event(EventKind::Transfer).with_ies(ies))
            }
            Command::Quelch => {
                self.sessions.require(call)?.quelch = true;
                Outcome::Immediate(event(EventKind::Quelch).with_ies(ies))
            }
            Command::Unquelch => {
                self.sessions.require(call)?.quelch = false;
                Outcome::Immediate(event(EventKind::Unquelch))
            }
            Command::TxRej => {
                self.handle_txreject(call);
                Outcome::Immediate(event(EventKind::TransferReject).with_ies(ies))
            }
            Command::TxReady => {
                self.send_ack(call, ts, header.iseqno)?;
                if self.handle_txready(call)? {
                    Outcome::Immediate(event(EventKind::TransferReady))
                } else {
                    Outcome::Handled
                }
            }
            Command::Vnak => {
                self.retransmit_pending(call)?;
                Outcome::Handled
            }
            other => {
                debug!(call = %call, command = ?other, "command not handled");
                Outcome::Handled
            }
        };
        Ok(outcome)
    }

    fn receive_mini(&mut self, header: &MiniHeader, payload: &[u8], from: SocketAddr) {
        let Some(call) = self.sessions.find(from, header.call, 0) else {
            trace!(%from, source = header.call, "no session for mini frame");
            return;
        };
        let Some(session) = self.sessions.get_mut(call) else {
            return;
        };
        let Some(format) = session.voice_format else {
            debug!(call = %call, "mini frame before any voice format");
            return;
        };
        let ts = session.rx.expand_mini(header.timestamp);
        let event = Event::new(call, EventKind::Voice)
            .with_subclass(format.bits())
            .with_ts(ts)
            .with_payload(payload);
        self.schedule_delivery(event, true);
    }

    /// Queue an event for delivery: through the jitter buffer, or straight
    /// onto the scheduler when the buffer is disabled.
    pub(crate) fn schedule_delivery(&mut self, event: Event, update_history: bool) {
        let now = self.now_ms();
        let call = event.call;
        let Some(session) = self.sessions.get_mut(call) else {
            return;
        };
        let ts = session.rx.unwrap(event.ts);
        session.rx.observe(ts);
        let arrival = session.rx.stamp(now);
        let event = event.with_ts(ts);

        if !self.config.use_jitterbuffer {
            if update_history {
                session.lag.push(arrival - i64::from(ts));
            }
            self.scheduler.add(now, Scheduled::Event(event));
            return;
        }

        let (kind, ms) = match event.kind {
            EventKind::Voice => {
                let samples = Format(event.subclass).sample_count(&event.payload);
                (FrameKind::Voice, i64::from(samples / 8))
            }
            EventKind::Cng => (FrameKind::Silence, 0),
            _ => (FrameKind::Control, 0),
        };
        if let PutResult::Dropped(frame) =
            session.jitterbuf.put(event, kind, ms, i64::from(ts), arrival)
        {
            trace!(call = %call, ts = frame.ts, "jitter buffer refused frame");
        }
    }

    /// Resend every frame of `call` still awaiting acknowledgement.
    fn retransmit_pending(&mut self, call: CallNumber) -> EngineResult<()> {
        let session = self.sessions.require(call)?;
        let frames = self.scheduler.pending_frames(call);
        debug!(call = %call, frames = frames.len(), "retransmitting on request");
        for mut frame in frames {
            let Some(addr) = session.destination(frame.transfer) else {
                continue;
            };
            mark_retransmit(&mut frame.data);
            xmit(&self.transport, &frame.data, addr)?;
        }
        Ok(())
    }
}
