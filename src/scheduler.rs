//! Time-ordered queue of deferred work.
//!
//! Holds reliable frames awaiting retransmission, events awaiting
//! delivery, periodic pings and arbitrary callbacks. Entries are kept
//! sorted by due time; an entry added with the same due time as existing
//! ones goes after them.
//!
//! Acknowledging or abandoning a frame never removes it directly: the
//! entry is turned into [`Scheduled::Cancelled`] and released when it
//! next comes due.

use std::collections::VecDeque;
use std::fmt;

use tracing::trace;

use crate::event::{CallNumber, Event};

/// A reliable full frame owned by the scheduler until acknowledged or
/// out of retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Session the frame belongs to.
    pub call: CallNumber,
    /// Encoded datagram, header included.
    pub data: Vec<u8>,
    /// Sequence number carried in the header.
    pub oseqno: u8,
    /// Retransmissions still allowed.
    pub retries_left: u32,
    /// Delay before the next retransmission.
    pub retry_interval_ms: u64,
    /// Sent to the transfer address instead of the peer.
    pub transfer: bool,
    /// Closing frame; the session goes away with it.
    pub final_frame: bool,
}

/// Timer kinds.
pub enum Timer {
    /// Periodic RTT probe for a session.
    Ping(CallNumber),
    /// Arbitrary deferred work.
    Callback(Box<dyn FnOnce() + Send>),
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping(call) => f.debug_tuple("Ping").field(call).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// A frame that no longer needs sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    /// Session the frame belonged to.
    pub call: CallNumber,
    /// Destroy the session when this entry is released.
    pub release_session: bool,
}

/// One scheduled item.
#[derive(Debug)]
pub enum Scheduled {
    /// Timer callback.
    Timer(Timer),
    /// Event awaiting delivery.
    Event(Event),
    /// Reliable frame awaiting its next retransmission.
    Frame(OutboundFrame),
    /// Acknowledged or abandoned frame awaiting release.
    Cancelled(Cancelled),
}

impl Scheduled {
    fn call(&self) -> Option<CallNumber> {
        match self {
            Self::Timer(Timer::Ping(call)) => Some(*call),
            Self::Timer(Timer::Callback(_)) => None,
            Self::Event(event) => Some(event.call),
            Self::Frame(frame) => Some(frame.call),
            Self::Cancelled(cancelled) => Some(cancelled.call),
        }
    }
}

#[derive(Debug)]
struct Entry {
    when: u64,
    item: Scheduled,
}

/// The scheduler queue.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: VecDeque<Entry>,
}

impl Scheduler {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, cancelled ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schedule `item` at absolute time `when` (ms).
    pub fn add(&mut self, when: u64, item: Scheduled) {
        let index = self.entries.partition_point(|entry| entry.when <= when);
        self.entries.insert(index, Entry { when, item });
    }

    /// Remove and return the earliest entry due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<Scheduled> {
        if self.entries.front()?.when > now {
            return None;
        }
        self.entries.pop_front().map(|entry| entry.item)
    }

    /// Due time of the earliest entry.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.when)
    }

    /// Cancel every frame of `call` whose sequence number lies in
    /// `[from, to)`, modulo 256.
    pub fn acknowledge(&mut self, call: CallNumber, from: u8, to: u8) -> usize {
        let span = to.wrapping_sub(from);
        let mut count = 0;
        for entry in &mut self.entries {
            let Scheduled::Frame(frame) = &entry.item else {
                continue;
            };
            if frame.call != call || frame.oseqno.wrapping_sub(from) >= span {
                continue;
            }
            trace!(call = %call, seq = frame.oseqno, "frame acknowledged");
            entry.item = Scheduled::Cancelled(Cancelled {
                call,
                release_session: frame.final_frame,
            });
            count += 1;
        }
        count
    }

    /// Cancel every pending frame of `call` without releasing the session.
    pub fn cancel_frames(&mut self, call: CallNumber) {
        for entry in &mut self.entries {
            if matches!(&entry.item, Scheduled::Frame(frame) if frame.call == call) {
                entry.item = Scheduled::Cancelled(Cancelled {
                    call,
                    release_session: false,
                });
            }
        }
    }

    /// Cancel the pending frames of `call` that went to its transfer
    /// address. Frames on the primary path keep retrying.
    pub fn cancel_transfer_frames(&mut self, call: CallNumber) -> usize {
        let mut count = 0;
        for entry in &mut self.entries {
            if matches!(&entry.item, Scheduled::Frame(frame) if frame.call == call && frame.transfer) {
                entry.item = Scheduled::Cancelled(Cancelled {
                    call,
                    release_session: false,
                });
                count += 1;
            }
        }
        count
    }

    /// Scrub a session that is going away: frames are cancelled, while
    /// events and timers for it are dropped outright.
    pub fn purge_session(&mut self, call: CallNumber) {
        self.cancel_frames(call);
        self.entries.retain(|entry| match &entry.item {
            Scheduled::Event(_) | Scheduled::Timer(Timer::Ping(_)) => {
                entry.item.call() != Some(call)
            }
            Scheduled::Cancelled(cancelled) => {
                // nothing left to release
                cancelled.call != call || !cancelled.release_session
            }
            _ => true,
        });
    }

    /// Drop the ping timer of `call`.
    pub fn cancel_ping(&mut self, call: CallNumber) {
        self.entries
            .retain(|entry| !matches!(entry.item, Scheduled::Timer(Timer::Ping(c)) if c == call));
    }

    /// Pending frames of `call`, in due order.
    pub fn pending_frames(&self, call: CallNumber) -> Vec<OutboundFrame> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.item {
                Scheduled::Frame(frame) if frame.call == call => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::event::EventKind;

    fn test_frame(call: u16, oseqno: u8, final_frame: bool) -> Scheduled {
        Scheduled::Frame(OutboundFrame {
            call: CallNumber(call),
            data: vec![0x80, 0x01],
            oseqno,
            retries_left: 10,
            retry_interval_ms: 60,
            transfer: false,
            final_frame,
        })
    }

    fn test_event(call: u16) -> Scheduled {
        Scheduled::Event(Event::new(CallNumber(call), EventKind::Text))
    }

    #[test]
    fn test_time_order_and_ties() {
        let mut sched = Scheduler::new();
        sched.add(30, test_frame(1, 3, false));
        sched.add(10, test_frame(1, 1, false));
        sched.add(10, test_frame(1, 2, false));

        assert_eq!(sched.next_due(), Some(10));
        assert!(sched.pop_due(9).is_none());

        let seqs: Vec<u8> = std::iter::from_fn(|| sched.pop_due(100))
            .map(|item| match item {
                Scheduled::Frame(frame) => frame.oseqno,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_acknowledge_range() {
        let mut sched = Scheduler::new();
        for seq in 0..4 {
            sched.add(10, test_frame(1, seq, false));
        }
        sched.add(10, test_frame(2, 1, false));

        assert_eq!(sched.acknowledge(CallNumber(1), 1, 3), 2);
        let pending: Vec<u8> = sched
            .pending_frames(CallNumber(1))
            .iter()
            .map(|frame| frame.oseqno)
            .collect();
        assert_eq!(pending, vec![0, 3]);
        assert_eq!(sched.pending_frames(CallNumber(2)).len(), 1);
        // cancelled entries stay queued until released
        assert_eq!(sched.len(), 5);
    }

    #[test]
    fn test_acknowledge_wraps() {
        let mut sched = Scheduler::new();
        sched.add(10, test_frame(1, 254, false));
        sched.add(10, test_frame(1, 255, false));
        sched.add(10, test_frame(1, 0, false));
        sched.add(10, test_frame(1, 1, false));

        assert_eq!(sched.acknowledge(CallNumber(1), 254, 1), 3);
        let pending = sched.pending_frames(CallNumber(1));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].oseqno, 1);
    }

    #[test]
    fn test_acknowledged_final_frame_releases_session() {
        let mut sched = Scheduler::new();
        sched.add(10, test_frame(4, 0, true));
        sched.acknowledge(CallNumber(4), 0, 1);
        match sched.pop_due(10) {
            Some(Scheduled::Cancelled(cancelled)) => {
                assert_eq!(cancelled.call, CallNumber(4));
                assert!(cancelled.release_session);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancel_transfer_frames_only() {
        let mut sched = Scheduler::new();
        sched.add(10, test_frame(1, 0, false));
        if let Scheduled::Frame(mut frame) = test_frame(1, 0, false) {
            frame.transfer = true;
            sched.add(10, Scheduled::Frame(frame));
        }
        sched.add(10, test_frame(1, 1, true));
        sched.add(10, test_frame(2, 0, false));

        assert_eq!(sched.cancel_transfer_frames(CallNumber(1)), 1);
        let pending: Vec<(u8, bool)> = sched
            .pending_frames(CallNumber(1))
            .iter()
            .map(|frame| (frame.oseqno, frame.final_frame))
            .collect();
        assert_eq!(pending, vec![(0, false), (1, true)]);
        assert_eq!(sched.pending_frames(CallNumber(2)).len(), 1);
    }

    #[test]
    fn test_purge_session() {
        let mut sched = Scheduler::new();
        sched.add(5, test_event(1));
        sched.add(6, Scheduled::Timer(Timer::Ping(CallNumber(1))));
        sched.add(7, test_frame(1, 0, false));
        sched.add(8, test_event(2));

        sched.purge_session(CallNumber(1));
        assert_eq!(sched.len(), 2);
        assert!(sched.pending_frames(CallNumber(1)).is_empty());
        assert!(matches!(
            sched.pop_due(100),
            Some(Scheduled::Cancelled(Cancelled {
                release_session: false,
                ..
            }))
        ));
        assert!(matches!(sched.pop_due(100), Some(Scheduled::Event(_))));
    }

    #[test]
    fn test_cancel_ping() {
        let mut sched = Scheduler::new();
        sched.add(5, Scheduled::Timer(Timer::Ping(CallNumber(1))));
        sched.add(5, Scheduled::Timer(Timer::Ping(CallNumber(2))));
        sched.cancel_ping(CallNumber(1));
        assert!(matches!(
            sched.pop_due(5),
            Some(Scheduled::Timer(Timer::Ping(CallNumber(2))))
        ));
    }

    #[test]
    fn test_callback_timer() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let mut sched = Scheduler::new();
        sched.add(
            1,
            Scheduled::Timer(Timer::Callback(Box::new(move || {
                flag.store(true, Ordering::SeqCst)
            }))),
        );
        match sched.pop_due(1) {
            Some(Scheduled::Timer(Timer::Callback(callback))) => callback(),
            other => panic!("unexpected {other:?}"),
        }
        assert!(fired.load(Ordering::SeqCst));
        sched.clear();
        assert!(sched.next_due().is_none());
    }
}
