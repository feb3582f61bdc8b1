//! Adaptive jitter buffer.
//!
//! Independent of networking: callers feed `(payload, timestamp, arrival
//! time)` with [`Jitterbuf::put`] and ask what to play with
//! [`Jitterbuf::get`].
//!
//! ```text
//!   put(ts, now) ──► delay history ──► jitter, min ──► target delay
//!        │                                               │
//!        ▼                                               ▼
//!   time-ordered queue ──────────► get(now) ──► Frame | Dropped
//!                                               Interpolate | NoFrame
//! ```

mod buffer;
mod history;
mod queue;

pub use buffer::{
    FrameKind, GetResult, JitterConfig, JitterFrame, JitterInfo, Jitterbuf, PutResult,
    constants as jitter_constants,
};
pub use history::DelayHistory;
