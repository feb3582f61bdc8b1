//! Per-session timestamp computation.
//!
//! Outgoing frames carry milliseconds since the session's first
//! transmission. Voice timestamps are snapped to a running prediction so
//! that small scheduling jitter on the sending side does not leak onto the
//! wire; inbound mini frames only carry 16 bits and are re-expanded
//! against the last full timestamp seen.

use crate::core::timing::{MIN_TIMESTAMP_INCREMENT, MINI_WRAP_WINDOW_MS, PREDICTION_WINDOW_MS};

/// What is being timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Voice frame carrying `samples` 8 kHz samples.
    Voice {
        /// Sample count of the payload.
        samples: u32,
    },
    /// Protocol command; must never move backwards.
    Command,
    /// Any other frame (DTMF, text, control...).
    Other,
}

/// Send-side timing state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendTiming {
    /// Clock reading that maps to timestamp 0, set on first send.
    offset: Option<i64>,
    /// Last timestamp sent on a non-command frame.
    last_sent: i64,
    /// Predicted timestamp of the next voice frame.
    next_pred: i64,
    /// Whether the last voice transmission was not silence.
    not_silent_tx: bool,
}

impl SendTiming {
    /// Last timestamp sent on a non-command frame.
    pub fn last_sent(&self) -> u32 {
        self.last_sent as u32
    }

    /// Forget all timing, as after a transfer.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Note that comfort noise was sent; the next voice frame reseeds its
    /// prediction.
    pub fn mark_silent(&mut self) {
        self.not_silent_tx = false;
    }

    /// Compute the timestamp for a frame sent at `now_ms`.
    ///
    /// A non-zero `explicit` timestamp is returned verbatim.
    pub fn stamp(&mut self, now_ms: u64, explicit: Option<u32>, kind: TxKind) -> u32 {
        let now = now_ms as i64;
        let offset = *self.offset.get_or_insert(now);
        if let Some(ts) = explicit.filter(|ts| *ts != 0) {
            return ts;
        }

        let mut ms = (now - offset).max(0);
        match kind {
            TxKind::Voice { samples } => {
                let frame_ms = i64::from(samples / 8);
                if self.not_silent_tx && (ms - self.next_pred).abs() <= PREDICTION_WINDOW_MS {
                    // drift correction: pull the origin toward the prediction
                    self.offset = Some(offset + (ms - self.next_pred) / 10);
                    if self.next_pred == 0 {
                        self.next_pred = ms;
                    }
                    ms = self.next_pred;
                } else {
                    if frame_ms > 0 {
                        let rem = ms % frame_ms;
                        if rem != 0 {
                            ms += frame_ms - rem;
                        }
                    }
                    self.next_pred = ms;
                }
                self.not_silent_tx = true;
                self.last_sent = ms;
                self.next_pred += frame_ms;
            }
            TxKind::Command => {
                if ms <= self.last_sent {
                    ms = self.last_sent + MIN_TIMESTAMP_INCREMENT;
                }
            }
            TxKind::Other => {
                if (ms - self.last_sent).abs() <= PREDICTION_WINDOW_MS {
                    ms = self.last_sent + MIN_TIMESTAMP_INCREMENT;
                }
                self.last_sent = ms;
            }
        }
        ms as u32
    }
}

/// Receive-side timing state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecvTiming {
    /// Clock reading of the first received frame.
    rxcore: Option<u64>,
    /// Highest full timestamp received.
    last_ts: u32,
}

impl RecvTiming {
    /// Forget all timing.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clock reading of the first received frame.
    pub fn core(&self) -> Option<u64> {
        self.rxcore
    }

    /// Milliseconds since the first received frame.
    pub fn stamp(&mut self, now_ms: u64) -> i64 {
        let core = *self.rxcore.get_or_insert(now_ms);
        now_ms as i64 - core as i64
    }

    /// Highest timestamp received so far.
    pub fn last_ts(&self) -> u32 {
        self.last_ts
    }

    /// Advance the highest received timestamp.
    pub fn observe(&mut self, ts: u32) {
        if ts > self.last_ts {
            self.last_ts = ts;
        }
    }

    /// Rebuild a full timestamp from the 16 bits of a mini frame.
    pub fn expand_mini(&self, low: u16) -> u32 {
        (self.last_ts & 0xFFFF_0000) | u32::from(low)
    }

    /// Correct a timestamp whose low half wrapped relative to `last_ts`.
    pub fn unwrap(&self, ts: u32) -> u32 {
        let last = self.last_ts;
        if ts & 0xFFFF_0000 != last & 0xFFFF_0000 {
            return ts;
        }
        let delta = i64::from(ts) - i64::from(last);
        let high = last & 0xFFFF_0000;
        if delta < -MINI_WRAP_WINDOW_MS {
            high.wrapping_add(0x1_0000) | (ts & 0xFFFF)
        } else if delta > MINI_WRAP_WINDOW_MS {
            high.wrapping_sub(0x1_0000) | (ts & 0xFFFF)
        } else {
            ts
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_stamp_sets_origin() {
        let mut timing = SendTiming::default();
        assert_eq!(timing.stamp(5000, None, TxKind::Command), 3);
        assert_eq!(timing.stamp(5100, None, TxKind::Command), 100);
    }

    #[test]
    fn test_explicit_timestamp_verbatim() {
        let mut timing = SendTiming::default();
        assert_eq!(timing.stamp(5000, Some(777), TxKind::Other), 777);
        // zero means "compute"
        assert_eq!(timing.stamp(5050, Some(0), TxKind::Command), 50);
    }

    #[test]
    fn test_command_never_moves_backwards() {
        let mut timing = SendTiming::default();
        timing.stamp(1000, None, TxKind::Command);
        let a = timing.stamp(1500, None, TxKind::Other);
        assert_eq!(a, 500);
        let b = timing.stamp(1400, None, TxKind::Command);
        assert_eq!(b, 503);
    }

    #[test]
    fn test_voice_rounds_to_frame_then_predicts() {
        let mut timing = SendTiming::default();
        timing.stamp(1000, None, TxKind::Command);

        // 33ms elapsed rounds up to the next 20ms frame boundary
        let first = timing.stamp(1033, None, TxKind::Voice { samples: 160 });
        assert_eq!(first, 40);

        // next frame arrives 5ms late; snapped to prediction
        let second = timing.stamp(1058, None, TxKind::Voice { samples: 160 });
        assert_eq!(second, 60);

        // far from the prediction: reseeded
        let third = timing.stamp(1600, None, TxKind::Voice { samples: 160 });
        assert_eq!(third % 20, 0);
        assert!(third >= 600);
    }

    #[test]
    fn test_silence_reseeds_prediction() {
        let mut timing = SendTiming::default();
        timing.stamp(1000, None, TxKind::Command);
        assert_eq!(timing.stamp(1020, None, TxKind::Voice { samples: 160 }), 20);
        timing.mark_silent();
        // 47ms would snap to 40 without the silence mark
        assert_eq!(timing.stamp(1047, None, TxKind::Voice { samples: 160 }), 60);
    }

    #[test]
    fn test_voice_zero_samples() {
        let mut timing = SendTiming::default();
        timing.stamp(100, None, TxKind::Command);
        assert_eq!(timing.stamp(137, None, TxKind::Voice { samples: 0 }), 37);
    }

    #[test]
    fn test_recv_stamp_and_mini_expand() {
        let mut rx = RecvTiming::default();
        assert_eq!(rx.stamp(2000), 0);
        assert_eq!(rx.stamp(2150), 150);

        rx.observe(0x0003_FFF0);
        rx.observe(0x0001_0000);
        assert_eq!(rx.last_ts(), 0x0003_FFF0);
        assert_eq!(rx.expand_mini(0x0010), 0x0003_0010);
    }

    #[test]
    fn test_unwrap_forward_and_back() {
        let mut rx = RecvTiming::default();
        rx.observe(0x0002_FFF0);
        // low half wrapped forward past 0xFFFF
        assert_eq!(rx.unwrap(0x0002_0010), 0x0003_0010);
        // near value untouched
        assert_eq!(rx.unwrap(0x0002_FF00), 0x0002_FF00);

        let mut rx = RecvTiming::default();
        rx.observe(0x0003_0010);
        // late frame from before the wrap
        assert_eq!(rx.unwrap(0x0003_FFF0), 0x0002_FFF0);
    }
}
