//! The event loop: due timers, retransmissions and jitter-buffer playout.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::core::timing::{MAX_RETRY_MS, MAX_TRANSFER_RETRY_MS, RETRY_BACKOFF};
use crate::event::{CallNumber, Event, EventKind};
use crate::frame::{Format, mark_retransmit};
use crate::jitter::GetResult;
use crate::scheduler::{OutboundFrame, Scheduled, Timer};
use crate::transport::Transport;

#[cfg(feature = "transport")]
use crate::core::EngineResult;

use super::{Engine, xmit};

/// How long [`Engine::get_event`] may wait for the network.
#[cfg(feature = "transport")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return at once if nothing is ready.
    NonBlocking,
    /// Wait until an event arrives.
    Forever,
    /// Wait at most this long.
    Timeout(Duration),
}

#[cfg(feature = "transport")]
const MIN_WAIT: Duration = Duration::from_millis(1);

impl<T: Transport> Engine<T> {
    /// Run everything due now and return the first event it produces.
    ///
    /// Scheduler entries are handled in due order, then each session's
    /// jitter buffer gets one chance to play.
    pub fn poll(&mut self) -> Option<Event> {
        let now = self.now_ms();
        while let Some(item) = self.scheduler.pop_due(now) {
            if let Some(event) = self.dispatch(item, now) {
                return Some(event);
            }
        }
        if self.config.use_jitterbuffer {
            return self.play_out(now);
        }
        None
    }

    /// Time until the next timer, retransmission or playout.
    ///
    /// `None` when nothing is scheduled at all.
    pub fn time_to_next_event(&mut self) -> Option<Duration> {
        let now = self.now_ms();
        let mut next = self.scheduler.next_due();
        if self.config.use_jitterbuffer {
            for call in self.sessions.call_numbers() {
                let Some(session) = self.sessions.get_mut(call) else {
                    continue;
                };
                let Some(core) = session.rx.core() else {
                    continue;
                };
                let play = session.jitterbuf.next();
                if play == i64::MAX {
                    continue;
                }
                let at = (core as i64).saturating_add(play).max(0) as u64;
                next = Some(next.map_or(at, |n| n.min(at)));
            }
        }
        next.map(|at| Duration::from_millis(at.saturating_sub(now)))
    }

    fn dispatch(&mut self, item: Scheduled, now: u64) -> Option<Event> {
        match item {
            Scheduled::Event(event) => self.handle_event(event),
            Scheduled::Timer(Timer::Ping(call)) => {
                if !self.sessions.contains(call) {
                    return None;
                }
                match self.send_ping(call) {
                    Ok(()) => {
                        let interval = self.config.ping_interval;
                        self.schedule_ping(call, interval);
                    }
                    Err(e) => debug!(call = %call, error = %e, "ping not sent; timer stopped"),
                }
                None
            }
            Scheduled::Timer(Timer::Callback(callback)) => {
                callback();
                None
            }
            Scheduled::Cancelled(cancelled) => {
                if cancelled.release_session && self.destroy_session(cancelled.call) {
                    debug!(call = %cancelled.call, "closing frame acknowledged");
                }
                None
            }
            Scheduled::Frame(frame) => self.retry(frame, now),
        }
    }

    fn retry(&mut self, mut frame: OutboundFrame, now: u64) -> Option<Event> {
        let call = frame.call;
        let session = self.sessions.get(call)?;

        if frame.retries_left == 0 {
            if frame.transfer {
                debug!(call = %call, "transfer target never answered");
                self.abandon_transfer(call);
                return None;
            }
            let timeout = Event::new(call, EventKind::Timeout);
            if frame.final_frame {
                debug!(call = %call, seq = frame.oseqno, "closing frame unacknowledged");
                self.destroy_session(call);
                return Some(timeout);
            }
            debug!(call = %call, seq = frame.oseqno, "frame unacknowledged");
            return self.handle_event(timeout);
        }

        let Some(addr) = session.destination(frame.transfer) else {
            trace!(call = %call, seq = frame.oseqno, "no destination for retransmission");
            return None;
        };
        mark_retransmit(&mut frame.data);
        if let Err(e) = xmit(&self.transport, &frame.data, addr) {
            warn!(call = %call, error = %e, "retransmission failed");
        }
        trace!(
            call = %call,
            seq = frame.oseqno,
            retries_left = frame.retries_left,
            "frame retransmitted"
        );

        let ceiling = if frame.transfer {
            MAX_TRANSFER_RETRY_MS
        } else {
            MAX_RETRY_MS
        };
        frame.retries_left -= 1;
        frame.retry_interval_ms = (frame.retry_interval_ms * RETRY_BACKOFF).min(ceiling);
        self.scheduler
            .add(now + frame.retry_interval_ms, Scheduled::Frame(frame));
        None
    }

    fn play_out(&mut self, now: u64) -> Option<Event> {
        for call in self.sessions.call_numbers() {
            if let Some(event) = self.play_session(call, now) {
                return Some(event);
            }
        }
        None
    }

    fn play_session(&mut self, call: CallNumber, now: u64) -> Option<Event> {
        let session = self.sessions.get_mut(call)?;
        let core = session.rx.core()?;
        let rel = now as i64 - core as i64;
        if rel <= session.jitterbuf.next() {
            return None;
        }
        let format = session.voice_format.unwrap_or_default();
        let interp = session.voice_format.map_or(20, Format::interp_len_ms);
        match session.jitterbuf.get(rel, interp) {
            GetResult::Frame(frame) => self.handle_event(frame.data),
            GetResult::Interpolate { ms } => {
                trace!(call = %call, ms, "interpolating");
                let event = Event::new(call, EventKind::Voice)
                    .with_subclass(format.bits())
                    .with_ts(rel.max(0) as u32);
                self.handle_event(event)
            }
            GetResult::Dropped(frame) => {
                trace!(call = %call, ts = frame.ts, "late frame dropped");
                None
            }
            GetResult::NoFrame => None,
        }
    }

    /// Wait for the next event.
    ///
    /// Runs due work, drains the transport, and otherwise sleeps until a
    /// datagram arrives, a timer comes due or `wait` runs out. A pending
    /// [`request_shutdown`](Self::request_shutdown) shuts the engine down
    /// and returns `Ok(None)`.
    #[cfg(feature = "transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
    pub async fn get_event(&mut self, wait: Wait) -> EngineResult<Option<Event>> {
        let deadline = match wait {
            Wait::Timeout(limit) => Some(tokio::time::Instant::now() + limit),
            _ => None,
        };
        loop {
            if self.shutdown.take() {
                self.shutdown();
                return Ok(None);
            }
            if let Some(event) = self.poll() {
                return Ok(Some(event));
            }
            if let Some(event) = self.receive()? {
                return Ok(Some(event));
            }

            let timer = self.time_to_next_event().map(|d| d.max(MIN_WAIT));
            let budget = match (wait, deadline) {
                (Wait::NonBlocking, _) => return Ok(self.poll()),
                (Wait::Timeout(_), Some(deadline)) => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return Ok(self.poll());
                    }
                    Some(timer.map_or(remaining, |t| t.min(remaining)))
                }
                _ => timer,
            };
            trace!(budget = ?budget, "waiting for network");

            let readable = match budget {
                Some(limit) => match tokio::time::timeout(limit, self.transport.readable()).await {
                    Ok(result) => result,
                    Err(_) => Ok(()),
                },
                None => self.transport.readable().await,
            };
            readable?;
        }
    }
}
