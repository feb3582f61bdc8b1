//! Adaptive jitter buffer.
//!
//! Frames are queued by adjusted timestamp and released by [`Jitterbuf::get`]
//! at a playout delay that tracks the trimmed jitter of recent voice
//! arrivals. Timestamps and `now` share one millisecond time base chosen by
//! the caller.

use tracing::{debug, trace, warn};

use super::history::DelayHistory;
use super::queue::FrameQueue;

/// Tuning constants.
pub mod constants {
    /// Voice delay samples kept in history.
    pub const HISTORY_SIZE: usize = 500;
    /// Percentage of history trimmed at each end.
    pub const HISTORY_DROP_PCT: usize = 3;
    /// Extremes kept per end (`HISTORY_SIZE * HISTORY_DROP_PCT / 100`).
    pub const HISTORY_KEEP: usize = HISTORY_SIZE * HISTORY_DROP_PCT / 100;
    /// Default extra delay above jitter + minimum, in ms.
    pub const TARGET_EXTRA: i64 = 40;
    /// Minimum spacing between growth steps, in ms.
    pub const ADJUST_DELAY: i64 = 40;
    /// Consecutive delay discontinuities that force a resync.
    pub const RESYNC_COUNT: i64 = 3;
    /// Shrink cadence while a frame is available, in ms.
    pub const SHRINK_INTERVAL: i64 = 500;
    /// Shrink cadence while no frame is available, in ms.
    pub const SHRINK_IDLE_INTERVAL: i64 = 80;
    /// Shrink cadence during silence, in ms.
    pub const SILENCE_SHRINK_INTERVAL: i64 = 10;
    /// Marker timestamp for "silent since start".
    pub const SILENCE_ON_START: i64 = -1;
}

use constants::*;

/// Kind of a buffered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Signalling delivered in timestamp order.
    Control,
    /// Audio; contributes to delay history.
    Voice,
    /// Video.
    Video,
    /// Comfort noise; starts a silence period.
    Silence,
}

/// A queued frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitterFrame<T> {
    /// Caller payload.
    pub data: T,
    /// Adjusted timestamp in ms.
    pub ts: i64,
    /// Playout duration in ms.
    pub ms: i64,
    /// Frame kind.
    pub kind: FrameKind,
}

/// Jitter buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterConfig {
    /// Hard cap on buffered span and target delay in ms (0 = uncapped).
    pub max_jitterbuf: i64,
    /// Delay jump beyond `2 * jitter` that counts as a discontinuity
    /// (-1 disables resync).
    pub resync_threshold: i64,
    /// Consecutive interpolations before declaring silence (0 = unlimited).
    pub max_contig_interp: i64,
    /// Extra delay above jitter + minimum in ms (negative selects the default).
    pub target_extra: i64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            max_jitterbuf: 0,
            resync_threshold: 1000,
            max_contig_interp: 0,
            target_extra: TARGET_EXTRA,
        }
    }
}

impl JitterConfig {
    fn effective_target_extra(&self) -> i64 {
        if self.target_extra < 0 {
            TARGET_EXTRA
        } else {
            self.target_extra
        }
    }
}

/// Counters and timing state, as returned by [`Jitterbuf::info`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterInfo {
    /// Frames accepted by `put`.
    pub frames_in: i64,
    /// Frames released by `get` or `drain`.
    pub frames_out: i64,
    /// Voice frames dropped for arriving after their play time.
    pub frames_late: i64,
    /// Voice frames missing at their play time.
    pub frames_lost: i64,
    /// Frames discarded by `put` or to shrink the buffer.
    pub frames_dropped: i64,
    /// Frames that arrived out of order.
    pub frames_ooo: i64,
    /// Frames currently queued.
    pub frames_cur: i64,
    /// Trimmed jitter estimate in ms.
    pub jitter: i64,
    /// Trimmed minimum delay in ms.
    pub min: i64,
    /// Current playout delay in ms.
    pub current: i64,
    /// Target playout delay in ms.
    pub target: i64,
    /// Smoothed loss, in thousandths of a percent.
    pub losspct: i64,
    /// Expected timestamp of the next voice frame.
    pub next_voice_ts: i64,
    /// Duration of the last voice frame in ms.
    pub last_voice_ms: i64,
    /// Timestamp at which the current silence began, if silent.
    pub silence_begin_ts: Option<i64>,
    /// Time of the last delay adjustment.
    pub last_adjustment: i64,
    /// Delay of the last in-threshold voice frame.
    pub last_delay: i64,
    /// Consecutive delay discontinuities seen.
    pub cnt_delay_discont: i64,
    /// Offset subtracted from timestamps since the last resync.
    pub resync_offset: i64,
    /// Consecutive interpolated frames.
    pub cnt_contig_interp: i64,
}

/// Outcome of [`Jitterbuf::put`].
#[derive(Debug, PartialEq, Eq)]
pub enum PutResult<T> {
    /// Queued behind an earlier frame.
    Queued,
    /// Queued as the new earliest frame; the caller should recompute its
    /// next wake-up time.
    Scheduled,
    /// Not queued; ownership returns to the caller.
    Dropped(JitterFrame<T>),
}

/// Outcome of [`Jitterbuf::get`].
#[derive(Debug, PartialEq, Eq)]
pub enum GetResult<T> {
    /// Play this frame now.
    Frame(JitterFrame<T>),
    /// Discard this frame (late, or dropped to shrink the buffer).
    Dropped(JitterFrame<T>),
    /// Synthesize `ms` of audio.
    Interpolate {
        /// Length of audio to synthesize.
        ms: i64,
    },
    /// Nothing to play.
    NoFrame,
}

type History = DelayHistory<HISTORY_SIZE, HISTORY_KEEP>;

/// Adaptive jitter buffer holding payloads of type `T`.
#[derive(Debug, Clone)]
pub struct Jitterbuf<T> {
    config: JitterConfig,
    info: JitterInfo,
    history: History,
    queue: FrameQueue<T>,
}

impl<T> Default for Jitterbuf<T> {
    fn default() -> Self {
        Self::new(JitterConfig::default())
    }
}

impl<T> Jitterbuf<T> {
    /// Create an empty buffer.
    pub fn new(config: JitterConfig) -> Self {
        let mut jb = Self {
            config,
            info: JitterInfo::default(),
            history: History::new(),
            queue: FrameQueue::default(),
        };
        jb.reset();
        jb
    }

    /// Empty the buffer and restart statistics, keeping the configuration.
    ///
    /// Queued frames are dropped; use [`drain`](Self::drain) first to
    /// recover them.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.history.reset();
        let extra = self.config.effective_target_extra();
        self.info = JitterInfo {
            current: extra,
            target: extra,
            silence_begin_ts: Some(SILENCE_ON_START),
            ..JitterInfo::default()
        };
    }

    /// Current configuration.
    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Replace the configuration and restart the delay at the new margin.
    pub fn set_config(&mut self, config: JitterConfig) {
        self.config = config;
        let extra = config.effective_target_extra();
        self.info.current = extra;
        self.info.target = extra;
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Counters and timing state.
    pub fn info(&mut self) -> JitterInfo {
        self.refresh_stats();
        JitterInfo {
            frames_cur: self.queue.len() as i64,
            ..self.info.clone()
        }
    }

    /// Queue a frame that arrived at `now`.
    pub fn put(&mut self, data: T, kind: FrameKind, ms: i64, ts: i64, now: i64) -> PutResult<T> {
        let frame = JitterFrame { data, ts, ms, kind };
        if kind == FrameKind::Voice && !self.history_put(ts, now) {
            self.info.frames_dropped += 1;
            return PutResult::Dropped(frame);
        }

        self.info.frames_in += 1;
        let adjusted = JitterFrame {
            ts: ts - self.info.resync_offset,
            ..frame
        };
        let inserted = self.queue.insert(adjusted);
        if inserted.out_of_order {
            self.info.frames_ooo += 1;
        }
        if inserted.head {
            PutResult::Scheduled
        } else {
            PutResult::Queued
        }
    }

    /// Record a voice arrival. Returns false when the frame must be dropped.
    fn history_put(&mut self, ts: i64, now: i64) -> bool {
        if ts <= 0 {
            return true;
        }
        let mut delay = now - (ts - self.info.resync_offset);
        let threshold = 2 * self.info.jitter + self.config.resync_threshold;

        if self.config.resync_threshold != -1 && (delay - self.info.last_delay).abs() > threshold {
            self.info.cnt_delay_discont += 1;
            if self.info.cnt_delay_discont < RESYNC_COUNT {
                trace!(delay, last_delay = self.info.last_delay, "delay discontinuity");
                return false;
            }
            self.history.reset();
            self.info.resync_offset = ts - now;
            self.info.cnt_delay_discont = 0;
            warn!(
                last_delay = self.info.last_delay,
                delay,
                threshold,
                offset = self.info.resync_offset,
                "resyncing jitter buffer"
            );
            delay = 0;
            self.info.last_delay = 0;
        } else {
            self.info.last_delay = delay;
            self.info.cnt_delay_discont = 0;
        }

        if self.config.max_jitterbuf > 0 {
            if let (Some(head), Some(tail)) = (self.queue.head_ts(), self.queue.tail_ts()) {
                if tail - head >= self.config.max_jitterbuf {
                    debug!(span = tail - head, "jitter buffer overfilled");
                    return false;
                }
            }
        }

        self.history.push(delay);
        true
    }

    fn refresh_stats(&mut self) {
        let (min, jitter) = self.history.stats();
        self.info.min = min;
        self.info.jitter = jitter;
    }

    fn target_delay(&self) -> i64 {
        let info = &self.info;
        let target = info.jitter + info.min + self.config.effective_target_extra();
        if self.config.max_jitterbuf > 0 && target - info.min > self.config.max_jitterbuf {
            info.min + self.config.max_jitterbuf
        } else {
            target
        }
    }

    fn queue_get(&mut self, ts: i64) -> Option<JitterFrame<T>> {
        let frame = self.queue.pop_due(ts)?;
        self.info.frames_out += 1;
        Some(frame)
    }

    fn increment_losspct(&mut self) {
        self.info.losspct = (100_000 + 499 * self.info.losspct) / 500;
    }

    fn decrement_losspct(&mut self) {
        self.info.losspct = (499 * self.info.losspct) / 500;
    }

    fn note_interpolation(&mut self) {
        self.info.cnt_contig_interp += 1;
        let cap = self.config.max_contig_interp;
        if cap > 0 && self.info.cnt_contig_interp >= cap {
            self.info.silence_begin_ts = Some(self.info.next_voice_ts - self.info.current);
        }
    }

    /// Fetch what to play at `now`. `interp_ms` is the length of one
    /// synthesized frame should interpolation be needed.
    pub fn get(&mut self, now: i64, interp_ms: i64) -> GetResult<T> {
        let result = self.get_inner(now, interp_ms);
        if matches!(result, GetResult::Interpolate { .. }) {
            return GetResult::Interpolate {
                ms: self.info.last_voice_ms,
            };
        }
        result
    }

    fn get_inner(&mut self, now: i64, interp_ms: i64) -> GetResult<T> {
        self.refresh_stats();
        self.info.target = self.target_delay();
        let diff = self.info.target - self.info.current;
        let extra = self.config.effective_target_extra();

        let Some(silence_begin) = self.info.silence_begin_ts else {
            return self.get_voice(now, interp_ms, diff, extra);
        };

        if diff < -extra && self.info.last_adjustment + SILENCE_SHRINK_INTERVAL <= now {
            self.info.current -= interp_ms;
            self.info.last_adjustment = now;
        }

        let Some(frame) = self.queue_get(now - self.info.current) else {
            return GetResult::NoFrame;
        };

        if frame.kind != FrameKind::Voice {
            if frame.kind == FrameKind::Silence {
                self.info.silence_begin_ts = Some(frame.ts);
                self.info.cnt_contig_interp = 0;
            }
            return GetResult::Frame(frame);
        }

        if frame.ts < silence_begin {
            // late, not lost
            self.info.frames_late += 1;
            self.info.frames_lost -= 1;
            self.decrement_losspct();
            return GetResult::Dropped(frame);
        }

        // first voice after silence: play immediately and rebase
        self.info.current = self.info.target;
        self.info.silence_begin_ts = None;
        self.info.next_voice_ts = frame.ts + self.info.current + frame.ms;
        self.info.last_voice_ms = frame.ms;
        self.info.cnt_contig_interp = 0;
        self.decrement_losspct();
        GetResult::Frame(frame)
    }

    fn get_voice(&mut self, now: i64, interp_ms: i64, diff: i64, extra: i64) -> GetResult<T> {
        let span = match (self.queue.head_ts(), self.queue.tail_ts()) {
            (Some(head), Some(tail)) => tail - head,
            _ => 0,
        };

        if diff > 0 && (self.info.last_adjustment + ADJUST_DELAY < now || diff > span) {
            self.info.current += interp_ms;
            self.info.next_voice_ts += interp_ms;
            self.info.last_voice_ms = interp_ms;
            self.info.last_adjustment = now;
            self.note_interpolation();
            trace!(current = self.info.current, "growing jitter buffer");
            return GetResult::Interpolate { ms: interp_ms };
        }

        let frame = match self.queue_get(self.info.next_voice_ts - self.info.current) {
            Some(f) if f.kind != FrameKind::Voice => {
                if f.kind == FrameKind::Silence {
                    self.info.silence_begin_ts = Some(f.ts);
                    self.info.cnt_contig_interp = 0;
                }
                return GetResult::Frame(f);
            }
            Some(f) if f.ts + self.info.current < self.info.next_voice_ts => {
                if f.ts + self.info.current > self.info.next_voice_ts - self.info.last_voice_ms {
                    // late, but inside one frame: play it and catch up
                    self.info.next_voice_ts = f.ts + self.info.current + f.ms;
                    self.info.cnt_contig_interp = 0;
                    self.decrement_losspct();
                    return GetResult::Frame(f);
                }
                self.info.frames_late += 1;
                self.info.frames_lost -= 1;
                self.decrement_losspct();
                return GetResult::Dropped(f);
            }
            other => other,
        };

        if let Some(f) = frame.as_ref()
            && f.ms > 0
        {
            self.info.last_voice_ms = f.ms;
        }

        if diff < -extra
            && ((frame.is_none() && self.info.last_adjustment + SHRINK_IDLE_INTERVAL < now)
                || self.info.last_adjustment + SHRINK_INTERVAL < now)
        {
            self.info.last_adjustment = now;
            self.info.cnt_contig_interp = 0;
            return match frame {
                Some(f) => {
                    self.info.current -= f.ms;
                    self.info.frames_dropped += 1;
                    self.decrement_losspct();
                    trace!(current = self.info.current, "shrinking jitter buffer");
                    GetResult::Dropped(f)
                }
                None => {
                    self.info.current -= self.info.last_voice_ms;
                    self.info.frames_lost += 1;
                    self.increment_losspct();
                    GetResult::NoFrame
                }
            };
        }

        let Some(f) = frame else {
            self.info.frames_lost += 1;
            self.increment_losspct();
            self.info.next_voice_ts += interp_ms;
            self.info.last_voice_ms = interp_ms;
            self.note_interpolation();
            return GetResult::Interpolate { ms: interp_ms };
        };

        self.info.next_voice_ts += f.ms;
        self.info.cnt_contig_interp = 0;
        self.decrement_losspct();
        GetResult::Frame(f)
    }

    /// Time at which [`get`](Self::get) should next be called.
    ///
    /// Returns `i64::MAX` while silent with nothing queued.
    pub fn next(&mut self) -> i64 {
        if self.info.silence_begin_ts.is_none() {
            return self.info.next_voice_ts;
        }
        let Some(head) = self.queue.head_ts() else {
            return i64::MAX;
        };
        self.refresh_stats();
        let target = self.target_delay();
        if target - self.info.current < -self.config.effective_target_extra() {
            self.info.last_adjustment + SILENCE_SHRINK_INTERVAL
        } else {
            head + target
        }
    }

    /// Pop any queued frame regardless of play time.
    pub fn drain(&mut self) -> Option<JitterFrame<T>> {
        let frame = self.queue.pop_front()?;
        self.info.frames_out += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(jb: &mut Jitterbuf<u32>, id: u32, ts: i64, now: i64) -> PutResult<u32> {
        jb.put(id, FrameKind::Voice, 20, ts, now)
    }

    #[test]
    fn test_first_frame_plays_after_target() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        assert_eq!(voice(&mut jb, 7, 1000, 1000), PutResult::Scheduled);

        let target = jb.info().target;
        match jb.get(1000 + target, 20) {
            GetResult::Frame(f) => {
                assert_eq!(f.data, 7);
                assert_eq!(f.ts, 1000);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_not_released_early() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 1, 1000, 1000);
        assert_eq!(jb.get(1000, 20), GetResult::NoFrame);
        assert_eq!(jb.len(), 1);
    }

    #[test]
    fn test_resync_on_third_discontinuity() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        for i in 0..5 {
            let ts = 1000 + i * 20;
            assert!(!matches!(voice(&mut jb, 0, ts, ts), PutResult::Dropped(_)));
        }

        // delay jumps by 5000ms, far above 2*jitter + 1000
        assert!(matches!(voice(&mut jb, 1, 1100, 6100), PutResult::Dropped(_)));
        assert_eq!(jb.info().cnt_delay_discont, 1);
        assert!(matches!(voice(&mut jb, 2, 1120, 6120), PutResult::Dropped(_)));
        assert_eq!(jb.info().cnt_delay_discont, 2);
        assert!(!matches!(voice(&mut jb, 3, 1140, 6140), PutResult::Dropped(_)));

        let info = jb.info();
        assert_eq!(info.cnt_delay_discont, 0);
        assert_eq!(info.resync_offset, 1140 - 6140);
        assert_eq!(info.last_delay, 0);
    }

    #[test]
    fn test_resync_disabled() {
        let config = JitterConfig {
            resync_threshold: -1,
            ..JitterConfig::default()
        };
        let mut jb = Jitterbuf::new(config);
        voice(&mut jb, 0, 1000, 1000);
        assert!(!matches!(voice(&mut jb, 1, 1020, 9020), PutResult::Dropped(_)));
        assert_eq!(jb.info().cnt_delay_discont, 0);
    }

    #[test]
    fn test_reset_idempotent() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        for i in 0..10 {
            voice(&mut jb, i as u32, 1000 + i * 20, 1000 + i * 25);
        }
        jb.get(2000, 20);

        jb.reset();
        let once = jb.info();
        jb.reset();
        let twice = jb.info();
        assert_eq!(once, twice);
        assert!(jb.is_empty());
        assert_eq!(twice.current, TARGET_EXTRA);
        assert_eq!(twice.silence_begin_ts, Some(SILENCE_ON_START));
    }

    #[test]
    fn test_reset_keeps_config() {
        let config = JitterConfig {
            target_extra: 60,
            ..JitterConfig::default()
        };
        let mut jb: Jitterbuf<u32> = Jitterbuf::new(config);
        jb.reset();
        assert_eq!(jb.config().target_extra, 60);
        assert_eq!(jb.info().target, 60);
    }

    #[test]
    fn test_negative_target_extra_uses_default() {
        let mut jb: Jitterbuf<u32> = Jitterbuf::new(JitterConfig::default());
        jb.set_config(JitterConfig {
            target_extra: -1,
            ..JitterConfig::default()
        });
        assert_eq!(jb.info().current, TARGET_EXTRA);
    }

    #[test]
    fn test_in_order_stream_plays_in_order() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        let mut played = Vec::new();
        let mut next_put = 0;

        for now in (1000..3000).step_by(10) {
            while next_put < 50 && 1000 + next_put * 20 <= now {
                let ts = 1000 + next_put * 20;
                voice(&mut jb, next_put as u32, ts, now);
                next_put += 1;
            }
            if now >= jb.next() {
                match jb.get(now, 20) {
                    GetResult::Frame(f) => {
                        assert!(f.ts <= now, "frame {} released before its time", f.ts);
                        played.push(f.ts);
                    }
                    GetResult::Dropped(_)
                    | GetResult::Interpolate { .. }
                    | GetResult::NoFrame => {}
                }
            }
        }

        assert!(!played.is_empty());
        assert!(played.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_missing_frame_interpolates() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 0, 1000, 1000);
        let GetResult::Frame(_) = jb.get(1040, 20) else {
            panic!("first frame should play");
        };

        // nothing queued at the next play time
        let next = jb.next();
        assert_eq!(jb.get(next, 20), GetResult::Interpolate { ms: 20 });
        assert_eq!(jb.info().frames_lost, 1);
        assert!(jb.info().losspct > 0);
    }

    #[test]
    fn test_late_drop_counts_as_late_not_lost() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 0, 1000, 1000);
        let GetResult::Frame(_) = jb.get(1040, 20) else {
            panic!("first frame should play");
        };
        let next = jb.next();
        assert_eq!(jb.get(next, 20), GetResult::Interpolate { ms: 20 });
        let before = jb.info();
        assert_eq!(before.frames_lost, 1);

        // the frame we interpolated over shows up after its slot
        voice(&mut jb, 1, 1020, 1020);
        let next = jb.next();
        match jb.get(next, 20) {
            GetResult::Dropped(f) => assert_eq!(f.ts, 1020),
            other => panic!("expected late drop, got {other:?}"),
        }
        let after = jb.info();
        assert_eq!(after.frames_late, 1);
        assert_eq!(after.frames_lost, 0);
        assert!(after.losspct < before.losspct);
    }

    #[test]
    fn test_late_voice_during_silence_not_counted_lost() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 0, 1000, 1000);
        jb.get(1040, 20);
        let next = jb.next();
        jb.get(next, 20);
        jb.put(1, FrameKind::Silence, 0, 1040, 1040);
        let next = jb.next();
        assert!(matches!(jb.get(next, 20), GetResult::Frame(_)));
        let before = jb.info();
        assert_eq!(before.silence_begin_ts, Some(1040));

        voice(&mut jb, 2, 1020, 1020);
        let next = jb.next();
        assert!(matches!(jb.get(next, 20), GetResult::Dropped(_)));
        let after = jb.info();
        assert_eq!(after.frames_late, 1);
        assert!(after.losspct < before.losspct);
    }

    #[test]
    fn test_control_frames_bypass_history() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        assert_eq!(
            jb.put(9, FrameKind::Control, 0, 500, 50_000),
            PutResult::Scheduled
        );
        assert_eq!(jb.info().cnt_delay_discont, 0);
        match jb.get(50_000, 20) {
            GetResult::Frame(f) => assert_eq!(f.kind, FrameKind::Control),
            other => panic!("expected control frame, got {other:?}"),
        }
    }

    #[test]
    fn test_silence_frame_enters_silence() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 0, 1000, 1000);
        jb.get(1040, 20);
        assert_eq!(jb.info().silence_begin_ts, None);

        jb.put(1, FrameKind::Silence, 0, 1020, 1020);
        let next = jb.next();
        match jb.get(next, 20) {
            GetResult::Frame(f) => assert_eq!(f.kind, FrameKind::Silence),
            other => panic!("expected silence frame, got {other:?}"),
        }
        assert_eq!(jb.info().silence_begin_ts, Some(1020));
    }

    #[test]
    fn test_overfill_drops() {
        let config = JitterConfig {
            max_jitterbuf: 100,
            ..JitterConfig::default()
        };
        let mut jb = Jitterbuf::new(config);
        for i in 0..6 {
            voice(&mut jb, i, 1000 + i64::from(i) * 20, 1000);
        }
        assert!(matches!(voice(&mut jb, 6, 1120, 1000), PutResult::Dropped(_)));
        assert_eq!(jb.info().frames_dropped, 1);
    }

    #[test]
    fn test_drain_returns_everything() {
        let mut jb = Jitterbuf::new(JitterConfig::default());
        voice(&mut jb, 1, 1000, 1000);
        voice(&mut jb, 2, 1020, 1020);
        assert_eq!(jb.drain().map(|f| f.data), Some(1));
        assert_eq!(jb.drain().map(|f| f.data), Some(2));
        assert!(jb.drain().is_none());
        assert_eq!(jb.next(), i64::MAX);
    }
}
