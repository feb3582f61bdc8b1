//! Outbound operations: call setup, signalling, media and registration.

use tracing::debug;

use crate::core::{EngineError, EngineResult, PROTOCOL_VERSION, auth, control, html};
use crate::event::CallNumber;
use crate::frame::ie::tag;
use crate::frame::{CodecPrefs, Command, Format, FrameType, IeBuilder, Ies};
use crate::transport::Transport;

use super::dial::{DialString, resolve_server};
use super::{Delivery, Engine, Outgoing};

/// Parameters of an outgoing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    /// `[user[:secret]@]host[:port][/exten[@context]]`
    pub dial: String,
    /// Caller id number.
    pub calling_number: Option<String>,
    /// Caller id name.
    pub calling_name: Option<String>,
    /// Preferred language.
    pub language: Option<String>,
    /// Desired voice format.
    pub format: Format,
    /// Every format we can receive.
    pub capability: Format,
    /// Codec preference order, sent when non-empty.
    pub codec_prefs: CodecPrefs,
    /// Supported sampling rates, sent when set.
    pub sampling_rate: Option<u16>,
}

impl CallRequest {
    /// Call `dial` offering `format` out of `capability`.
    pub fn new(dial: impl Into<String>, format: Format, capability: Format) -> Self {
        Self {
            dial: dial.into(),
            format,
            capability,
            ..Self::default()
        }
    }

    /// Set caller id.
    pub fn caller(mut self, number: impl Into<String>, name: impl Into<String>) -> Self {
        self.calling_number = Some(number.into());
        self.calling_name = Some(name.into());
        self
    }

    /// Set the preferred language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the codec preference order.
    pub fn codec_prefs(mut self, prefs: CodecPrefs) -> Self {
        self.codec_prefs = prefs;
        self
    }
}

/// Append the credential proof: MD5 of `challenge + secret` when the
/// server offers MD5, the secret itself otherwise.
fn with_proof(
    ies: IeBuilder,
    secret: &str,
    challenge: Option<&str>,
    methods: u16,
) -> EngineResult<IeBuilder> {
    Ok(match challenge {
        Some(challenge) if methods & auth::MD5 != 0 => {
            let digest = md5::compute(format!("{challenge}{secret}"));
            ies.string(tag::MD5_RESULT, &hex::encode(digest.0))?
        }
        _ => ies.string(tag::PASSWORD, secret)?,
    })
}

impl<T: Transport> Engine<T> {
    fn send_command(
        &mut self,
        call: CallNumber,
        command: Command,
        ies: &[u8],
        delivery: Delivery,
    ) -> EngineResult<()> {
        self.transmit(call, Outgoing::command(command, ies), delivery)
    }

    fn send_reliable(&mut self, call: CallNumber, kind: FrameType, subclass: u32, payload: &[u8]) -> EngineResult<()> {
        self.transmit(call, Outgoing::new(kind, subclass, payload), Delivery::Reliable)
    }

    /// Place a call. Resolves the host of the dial string, sends NEW and
    /// starts the session's ping timer.
    pub fn call(&mut self, call: CallNumber, request: &CallRequest) -> EngineResult<()> {
        let dial: DialString = request.dial.parse()?;
        let addr = dial.resolve()?;

        let mut ies = IeBuilder::new().short(tag::VERSION, PROTOCOL_VERSION)?;
        if let Some(rate) = request.sampling_rate {
            ies = ies.short(tag::SAMPLINGRATE, rate)?;
        }
        ies = ies
            .opt_string(tag::CALLING_NUMBER, request.calling_number.as_deref())?
            .opt_string(tag::CALLING_NAME, request.calling_name.as_deref())?;
        if !request.codec_prefs.formats().is_empty() {
            ies = ies.string(tag::CODEC_PREFS, &request.codec_prefs.to_wire())?;
        }
        let ies = ies
            .int(tag::FORMAT, request.format.bits())?
            .int(tag::CAPABILITY, request.capability.bits())?
            .opt_string(tag::LANGUAGE, request.language.as_deref())?
            .opt_string(tag::USERNAME, dial.username.as_deref())?
            .opt_string(tag::CALLED_NUMBER, dial.exten.as_deref())?
            .opt_string(tag::DNID, dial.exten.as_deref())?
            .opt_string(tag::CALLED_CONTEXT, dial.context.as_deref())?
            .build();

        let session = self.sessions.require(call)?;
        session.peer_addr = Some(addr);
        session.capability = request.capability;
        session.codec_prefs = request.codec_prefs.clone();
        session.credentials.username = dial.username.clone();
        session.credentials.secret = dial.secret.clone();
        debug!(call = %call, %addr, exten = ?dial.exten, "placing call");

        let first_ping = self.config.first_ping_delay;
        self.schedule_ping(call, first_ping);
        self.send_command(call, Command::New, &ies, Delivery::Reliable)
    }

    /// Accept an incoming call in `format`.
    pub fn accept(&mut self, call: CallNumber, format: Format) -> EngineResult<()> {
        let ies = IeBuilder::new().int(tag::FORMAT, format.bits())?.build();
        self.send_command(call, Command::Accept, &ies, Delivery::Reliable)
    }

    /// Signal answer.
    pub fn answer(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Control, control::ANSWER, &[])
    }

    /// Reject a call. The session closes once the peer acknowledges.
    pub fn reject(&mut self, call: CallNumber, reason: Option<&str>) -> EngineResult<()> {
        let ies = IeBuilder::new()
            .string(tag::CAUSE, reason.unwrap_or("Unspecified"))?
            .build();
        self.send_command(call, Command::Reject, &ies, Delivery::Final)
    }

    /// Hang up. The session closes once the peer acknowledges.
    pub fn hangup(&mut self, call: CallNumber, reason: Option<&str>) -> EngineResult<()> {
        let ies = IeBuilder::new()
            .string(tag::CAUSE, reason.unwrap_or("Normal clearing"))?
            .build();
        self.scheduler.cancel_ping(call);
        self.send_command(call, Command::Hangup, &ies, Delivery::Final)
    }

    /// Signal busy.
    pub fn busy(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Control, control::BUSY, &[])
    }

    /// Signal congestion.
    pub fn congestion(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Control, control::CONGESTION, &[])
    }

    /// Signal that the called party is ringing.
    pub fn ring_announce(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Control, control::RINGING, &[])
    }

    /// Dial digits on an established call.
    pub fn dial(&mut self, call: CallNumber, number: &str) -> EngineResult<()> {
        let ies = IeBuilder::new().string(tag::CALLED_NUMBER, number)?.build();
        self.send_command(call, Command::Dial, &ies, Delivery::Reliable)
    }

    /// Ask the peer whether `number` exists in its dial plan.
    pub fn dialplan_request(&mut self, call: CallNumber, number: &str) -> EngineResult<()> {
        let ies = IeBuilder::new().string(tag::CALLED_NUMBER, number)?.build();
        self.send_command(call, Command::DpReq, &ies, Delivery::Reliable)
    }

    /// Ask the peer to transfer the call to `number`.
    pub fn blind_transfer(&mut self, call: CallNumber, number: &str) -> EngineResult<()> {
        let ies = IeBuilder::new().string(tag::CALLED_NUMBER, number)?.build();
        self.send_command(call, Command::Transfer, &ies, Delivery::Reliable)
    }

    /// Ask the peer to stop sending audio.
    pub fn quelch(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_command(call, Command::Quelch, &[], Delivery::Reliable)
    }

    /// Ask the peer to resume audio.
    pub fn unquelch(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_command(call, Command::Unquelch, &[], Delivery::Reliable)
    }

    /// Quelch, optionally asking the peer to play music on hold. The
    /// music is lifted again when a transfer of this session ends.
    pub fn quelch_moh(&mut self, call: CallNumber, moh: bool) -> EngineResult<()> {
        let session = self.sessions.require(call)?;
        if session.quelch {
            return Err(EngineError::AlreadyQuelched(call.get()));
        }
        let mut ies = IeBuilder::new();
        if moh {
            ies = ies.flag(tag::MUSICONHOLD)?;
            session.transfer.moh = true;
        }
        self.send_command(call, Command::Quelch, &ies.build(), Delivery::Reliable)
    }

    /// Measure lag; answered by a [`LagReply`](crate::EventKind::LagReply).
    pub fn lag_request(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_command(call, Command::LagRq, &[], Delivery::Reliable)
    }

    /// Probe round-trip time; answered by a [`Pong`](crate::EventKind::Pong).
    pub fn send_ping(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_command(call, Command::Ping, &[], Delivery::Reliable)
    }

    /// Send one voice frame of `samples` 8 kHz samples. Silently skipped
    /// while the peer has us quelched.
    pub fn send_voice(
        &mut self,
        call: CallNumber,
        format: Format,
        data: &[u8],
        samples: u32,
    ) -> EngineResult<()> {
        if self.sessions.require(call)?.quelch {
            return Ok(());
        }
        let out = Outgoing::new(FrameType::Voice, format.bits(), data).samples(samples);
        self.transmit(call, out, Delivery::Reliable)
    }

    /// Send comfort noise at `level` dBov.
    pub fn send_cng(&mut self, call: CallNumber, level: u8, data: &[u8]) -> EngineResult<()> {
        self.sessions.require(call)?.tx.mark_silent();
        self.send_reliable(call, FrameType::Cng, u32::from(level), data)
    }

    /// Send a DTMF digit.
    pub fn send_dtmf(&mut self, call: CallNumber, digit: char) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Dtmf, u32::from(digit), &[])
    }

    /// Send an image.
    pub fn send_image(&mut self, call: CallNumber, format: u32, data: &[u8]) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Image, format, data)
    }

    /// Send a text message.
    pub fn send_text(&mut self, call: CallNumber, text: &str) -> EngineResult<()> {
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        self.send_reliable(call, FrameType::Text, 0, &payload)
    }

    /// Send a URL; `link` asks the peer to track it.
    pub fn send_url(&mut self, call: CallNumber, url: &str, link: bool) -> EngineResult<()> {
        let subclass = if link { html::LINKURL } else { html::URL };
        self.send_reliable(call, FrameType::Html, subclass, url.as_bytes())
    }

    /// Report that a URL finished loading.
    pub fn load_complete(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Html, html::LDCOMPLETE, &[])
    }

    /// Drop HTML linkage.
    pub fn send_unlink(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Html, html::UNLINK, &[])
    }

    /// Refuse a link request.
    pub fn send_link_reject(&mut self, call: CallNumber) -> EngineResult<()> {
        self.send_reliable(call, FrameType::Html, html::LINKREJECT, &[])
    }

    /// Register `peer` with the registrar at `server` (`host[:port]`),
    /// refreshing every `refresh` seconds. A REGAUTH challenge is answered
    /// with `secret`.
    pub fn register(
        &mut self,
        call: CallNumber,
        server: &str,
        peer: &str,
        secret: Option<&str>,
        refresh: u16,
    ) -> EngineResult<()> {
        let addr = resolve_server(server)?;
        let session = self.sessions.require(call)?;
        session.peer_addr = Some(addr);
        session.credentials.username = Some(peer.to_owned());
        session.credentials.secret = secret.map(str::to_owned);
        session.credentials.refresh = refresh;
        debug!(call = %call, %addr, peer, "registering");
        self.send_registration(call)
    }

    fn send_registration(&mut self, call: CallNumber) -> EngineResult<()> {
        let credentials = self.sessions.require(call)?.credentials.clone();
        let ies = IeBuilder::new()
            .opt_string(tag::USERNAME, credentials.username.as_deref())?
            .short(tag::REFRESH, credentials.refresh)?
            .build();
        self.send_command(call, Command::RegReq, &ies, Delivery::Reliable)
    }

    /// Answer an authentication request.
    pub fn auth_reply(
        &mut self,
        call: CallNumber,
        password: &str,
        challenge: Option<&str>,
        methods: u16,
    ) -> EngineResult<()> {
        let ies = with_proof(IeBuilder::new(), password, challenge, methods)?.build();
        self.send_command(call, Command::AuthRep, &ies, Delivery::Reliable)
    }

    /// Accept a registration. The session closes once acknowledged.
    pub fn ack_registration(&mut self, call: CallNumber) -> EngineResult<()> {
        let credentials = self.sessions.require(call)?.credentials.clone();
        let mut ies = IeBuilder::new().opt_string(tag::USERNAME, credentials.username.as_deref())?;
        if credentials.refresh != 0 {
            ies = ies.short(tag::REFRESH, credentials.refresh)?;
        }
        self.send_command(call, Command::RegAck, &ies.build(), Delivery::Final)
    }

    /// Refuse a registration. The session closes once acknowledged.
    pub fn reject_registration(&mut self, call: CallNumber, reason: Option<&str>) -> EngineResult<()> {
        let ies = IeBuilder::new()
            .string(tag::CAUSE, reason.unwrap_or("Unspecified"))?
            .build();
        self.send_command(call, Command::RegRej, &ies, Delivery::Final)
    }

    /// Challenge a registration with MD5.
    pub fn auth_registration(&mut self, call: CallNumber, challenge: &str) -> EngineResult<()> {
        let username = self.sessions.require(call)?.credentials.username.clone();
        let ies = IeBuilder::new()
            .short(tag::AUTHMETHODS, auth::MD5)?
            .string(tag::CHALLENGE, challenge)?
            .opt_string(tag::USERNAME, username.as_deref())?
            .build();
        self.send_command(call, Command::RegAuth, &ies, Delivery::Reliable)
    }

    /// Answer a REGAUTH challenge with the stored secret.
    pub(crate) fn regauth_reply(&mut self, call: CallNumber, challenge: &Ies) -> EngineResult<()> {
        let credentials = self.sessions.require(call)?.credentials.clone();
        let mut ies = IeBuilder::new()
            .opt_string(tag::USERNAME, credentials.username.as_deref())?
            .short(tag::REFRESH, credentials.refresh)?;
        if let Some(secret) = credentials.secret.as_deref() {
            ies = with_proof(
                ies,
                secret,
                challenge.challenge.as_deref(),
                challenge.auth_methods.unwrap_or(0),
            )?;
        }
        self.send_command(call, Command::RegReq, &ies.build(), Delivery::Reliable)
    }

    /// Echo a lag request.
    pub(crate) fn send_lag_reply(&mut self, call: CallNumber, ts: u32) -> EngineResult<()> {
        self.transmit(call, Outgoing::command(Command::LagRp, &[]).at(ts), Delivery::Reliable)
    }

    /// Answer a PING or POKE with our receiver report.
    pub(crate) fn send_pong(&mut self, call: CallNumber, ts: u32) -> EngineResult<()> {
        let use_jb = self.config.use_jitterbuffer;
        let stats = self.sessions.require(call)?.local_stats(use_jb);
        let loss = ((stats.losspct & 0xff) << 24) | (stats.losscnt & 0x00ff_ffff);
        let ies = IeBuilder::new()
            .int(tag::RR_JITTER, stats.jitter as u32)?
            .int(tag::RR_LOSS, loss as u32)?
            .int(tag::RR_PKTS, stats.packets as u32)?
            .short(tag::RR_DELAY, stats.delay as u16)?
            .int(tag::RR_DROPPED, stats.dropped as u32)?
            .int(tag::RR_OOO, stats.ooo as u32)?
            .build();
        self.transmit(call, Outgoing::command(Command::Pong, &ies).at(ts), Delivery::Reliable)
    }

    /// Acknowledge the frame stamped `ts`; `seqno` is the peer's next
    /// expected sequence number.
    pub(crate) fn send_ack(&mut self, call: CallNumber, ts: u32, seqno: u8) -> EngineResult<()> {
        let out = Outgoing::command(Command::Ack, &[]).at(ts).seqno(seqno);
        self.transmit(call, out, Delivery::Immediate)
    }

    /// Ask the peer to retransmit everything from our expected sequence
    /// number on.
    pub(crate) fn send_vnak(&mut self, call: CallNumber) -> EngineResult<()> {
        let iseqno = self.sessions.require(call)?.iseqno;
        let out = Outgoing::command(Command::Vnak, &[]).seqno(iseqno);
        self.transmit(call, out, Delivery::Immediate)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn test_call_sends_new_with_ies() {
        let (mut engine, clock) = engine();
        let call = engine.new_session().unwrap();
        let mut prefs = CodecPrefs::new();
        prefs.add(Format::ULAW);
        prefs.add(Format::GSM);
        let request = CallRequest::new("alice:pw@127.0.0.1:4570/100@default", Format::ULAW, Format(0x6))
            .caller("5551234", "Bob")
            .language("en")
            .codec_prefs(prefs);

        clock.advance_ms(1);
        engine.call(call, &request).unwrap();

        let frames = sent(&engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to, "127.0.0.1:4570".parse().unwrap());
        assert_eq!(frames[0].command(), Some(Command::New));
        assert_eq!(frames[0].full().dest_call, 0);

        let ies = frames[0].ies();
        assert_eq!(ies.version, Some(2));
        assert_eq!(ies.calling_number.as_deref(), Some("5551234"));
        assert_eq!(ies.calling_name.as_deref(), Some("Bob"));
        assert_eq!(ies.codec_prefs.as_deref(), Some("CB"));
        assert_eq!(ies.format, Some(Format::ULAW.bits()));
        assert_eq!(ies.capability, Some(0x6));
        assert_eq!(ies.language.as_deref(), Some("en"));
        assert_eq!(ies.username.as_deref(), Some("alice"));
        assert_eq!(ies.called_number.as_deref(), Some("100"));
        assert_eq!(ies.dnid.as_deref(), Some("100"));
        assert_eq!(ies.called_context.as_deref(), Some("default"));
        // the secret never goes on the wire in NEW
        assert_eq!(ies.password, None);

        let session = engine.session(call).unwrap();
        assert_eq!(session.credentials.secret.as_deref(), Some("pw"));
        assert_eq!(session.capability, Format(0x6));
    }

    #[test]
    fn test_call_rejects_bad_dial_string() {
        let (mut engine, _clock) = engine();
        let call = engine.new_session().unwrap();
        let request = CallRequest::new("user@/100", Format::ULAW, Format::ULAW);
        assert!(matches!(
            engine.call(call, &request),
            Err(EngineError::InvalidDialString(_))
        ));
        assert_eq!(engine.transport().sent_count(), 0);
    }

    #[test]
    fn test_first_ping_after_call() {
        let (mut engine, clock) = engine();
        let call = engine.new_session().unwrap();
        clock.advance_ms(1);
        engine
            .call(call, &CallRequest::new("127.0.0.1", Format::ULAW, Format::ULAW))
            .unwrap();
        sent(&engine);

        clock.advance_ms(1999);
        // NEW retransmissions aside, no ping yet
        while engine.poll().is_some() {}
        assert!(!sent_commands(&engine).contains(&Command::Ping));

        clock.advance_ms(1);
        while engine.poll().is_some() {}
        assert!(sent_commands(&engine).contains(&Command::Ping));
    }

    #[test]
    fn test_text_is_nul_terminated() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.send_text(call, "hi").unwrap();
        let frames = sent(&engine);
        assert_eq!(frames[0].full().kind(), Some(FrameType::Text));
        assert_eq!(frames[0].payload, b"hi\0");
    }

    #[test]
    fn test_send_url_and_html_signals() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.send_url(call, "http://example.org", true).unwrap();
        engine.send_url(call, "http://example.org", false).unwrap();
        engine.load_complete(call).unwrap();
        engine.send_unlink(call).unwrap();
        engine.send_link_reject(call).unwrap();

        let subclasses: Vec<u32> = sent(&engine).iter().map(|f| f.full().subclass()).collect();
        assert_eq!(
            subclasses,
            vec![html::LINKURL, html::URL, html::LDCOMPLETE, html::UNLINK, html::LINKREJECT]
        );
    }

    #[test]
    fn test_dtmf_and_control_subclasses() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.send_dtmf(call, '5').unwrap();
        engine.busy(call).unwrap();
        engine.congestion(call).unwrap();
        let frames = sent(&engine);
        assert_eq!(frames[0].full().kind(), Some(FrameType::Dtmf));
        assert_eq!(frames[0].full().subclass(), u32::from('5'));
        assert_eq!(frames[1].full().subclass(), control::BUSY);
        assert_eq!(frames[2].full().subclass(), control::CONGESTION);
    }

    #[test]
    fn test_quelched_voice_is_skipped() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        engine.sessions.get_mut(call).unwrap().quelch = true;
        clock.advance_ms(20);
        engine.send_voice(call, Format::ULAW, &[0u8; 160], 160).unwrap();
        assert_eq!(engine.transport().sent_count(), 0);
    }

    #[test]
    fn test_quelch_moh() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.quelch_moh(call, true).unwrap();
        let frames = sent(&engine);
        assert_eq!(frames[0].command(), Some(Command::Quelch));
        assert!(frames[0].ies().music_on_hold);
        assert!(engine.session(call).unwrap().transfer.moh);

        engine.sessions.get_mut(call).unwrap().quelch = true;
        assert!(matches!(
            engine.quelch_moh(call, false),
            Err(EngineError::AlreadyQuelched(_))
        ));
    }

    #[test]
    fn test_auth_reply_md5() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine
            .auth_reply(call, "secret", Some("12345"), auth::MD5 | auth::PLAINTEXT)
            .unwrap();
        let ies = sent(&engine)[0].ies();
        let expected = hex::encode(md5::compute(b"12345secret").0);
        assert_eq!(ies.md5_result.as_deref(), Some(expected.as_str()));
        assert_eq!(ies.password, None);
    }

    #[test]
    fn test_auth_reply_plaintext() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine
            .auth_reply(call, "secret", Some("12345"), auth::PLAINTEXT)
            .unwrap();
        let ies = sent(&engine)[0].ies();
        assert_eq!(ies.password.as_deref(), Some("secret"));
        assert_eq!(ies.md5_result, None);
    }

    #[test]
    fn test_register_sends_regreq() {
        let (mut engine, clock) = engine();
        let call = engine.new_session().unwrap();
        clock.advance_ms(5);
        engine
            .register(call, "127.0.0.1:4570", "6001", Some("pw"), 60)
            .unwrap();
        let frames = sent(&engine);
        assert_eq!(frames[0].to, "127.0.0.1:4570".parse().unwrap());
        assert_eq!(frames[0].command(), Some(Command::RegReq));
        let ies = frames[0].ies();
        assert_eq!(ies.username.as_deref(), Some("6001"));
        assert_eq!(ies.refresh, Some(60));
    }

    #[test]
    fn test_registration_replies_are_final() {
        let (mut engine, clock) = engine();
        let a = connected(&mut engine);
        let b = connected(&mut engine);
        clock.advance_ms(5);
        engine.ack_registration(a).unwrap();
        engine.reject_registration(b, Some("No such peer")).unwrap();
        assert!(engine.session(a).unwrap().closing);
        assert!(engine.session(b).unwrap().closing);
        let frames = sent(&engine);
        assert_eq!(frames[1].ies().cause.as_deref(), Some("No such peer"));
    }

    #[test]
    fn test_pong_carries_receiver_report() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.send_pong(call, 777).unwrap();
        let frames = sent(&engine);
        assert_eq!(frames[0].full().timestamp, 777);
        let ies = frames[0].ies();
        assert_eq!(ies.rr_loss, Some(0));
        assert_eq!(ies.rr_packets, Some(0));
        assert!(ies.rr_jitter.is_some());
        assert!(ies.rr_delay.is_some());
    }

    #[test]
    fn test_ack_is_never_retried() {
        let (mut engine, clock) = engine();
        let call = connected(&mut engine);
        clock.advance_ms(5);
        engine.send_ack(call, 55, 3).unwrap();
        let frames = sent(&engine);
        let header = frames[0].full();
        assert_eq!((header.timestamp, header.oseqno), (55, 3));
        assert!(engine.scheduler.pending_frames(call).is_empty());
        // explicit sequence numbers leave the counter alone
        assert_eq!(engine.session(call).unwrap().oseqno, 0);
    }
}
