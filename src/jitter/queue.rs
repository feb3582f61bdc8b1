//! Time-ordered queue of frames awaiting playout.

use std::collections::VecDeque;

use super::JitterFrame;

/// Result of inserting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Inserted {
    /// The frame became the earliest queued frame.
    pub head: bool,
    /// The frame arrived after a frame with a later timestamp.
    pub out_of_order: bool,
}

/// Frames sorted by adjusted timestamp.
///
/// Insertion scans from the tail, since arrivals are nearly in order.
#[derive(Debug, Clone)]
pub(crate) struct FrameQueue<T> {
    frames: VecDeque<JitterFrame<T>>,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self {
            frames: VecDeque::new(),
        }
    }
}

impl<T> FrameQueue<T> {
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn insert(&mut self, frame: JitterFrame<T>) -> Inserted {
        let Some(front) = self.frames.front() else {
            self.frames.push_back(frame);
            return Inserted {
                head: true,
                out_of_order: false,
            };
        };

        if frame.ts < front.ts {
            self.frames.push_front(frame);
            return Inserted {
                head: true,
                out_of_order: true,
            };
        }

        let mut pos = self.frames.len();
        while pos > 1 && frame.ts < self.frames[pos - 1].ts {
            pos -= 1;
        }
        let out_of_order = pos < self.frames.len();
        self.frames.insert(pos, frame);
        Inserted {
            head: false,
            out_of_order,
        }
    }

    /// Timestamp of the earliest frame.
    pub(crate) fn head_ts(&self) -> Option<i64> {
        self.frames.front().map(|f| f.ts)
    }

    /// Timestamp of the latest frame.
    pub(crate) fn tail_ts(&self) -> Option<i64> {
        self.frames.back().map(|f| f.ts)
    }

    /// Pop the earliest frame if it is due at `ts`.
    pub(crate) fn pop_due(&mut self, ts: i64) -> Option<JitterFrame<T>> {
        if self.frames.front().is_some_and(|f| ts >= f.ts) {
            self.frames.pop_front()
        } else {
            None
        }
    }

    /// Pop the earliest frame unconditionally.
    pub(crate) fn pop_front(&mut self) -> Option<JitterFrame<T>> {
        self.frames.pop_front()
    }

    /// Whether any queued frame is voice.
    #[cfg(test)]
    pub(crate) fn has_voice(&self) -> bool {
        self.frames
            .iter()
            .any(|f| f.kind == super::FrameKind::Voice)
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::FrameKind;

    fn frame(ts: i64) -> JitterFrame<i64> {
        JitterFrame {
            data: ts,
            ts,
            ms: 20,
            kind: FrameKind::Voice,
        }
    }

    #[test]
    fn test_insert_in_order() {
        let mut queue = FrameQueue::default();
        assert!(queue.insert(frame(10)).head);
        let inserted = queue.insert(frame(30));
        assert!(!inserted.head);
        assert!(!inserted.out_of_order);
        assert_eq!(queue.tail_ts(), Some(30));
        assert!(queue.has_voice());
    }

    #[test]
    fn test_insert_out_of_order() {
        let mut queue = FrameQueue::default();
        queue.insert(frame(10));
        queue.insert(frame(50));
        let inserted = queue.insert(frame(30));
        assert!(inserted.out_of_order);
        assert!(!inserted.head);

        let inserted = queue.insert(frame(5));
        assert!(inserted.head);
        assert!(inserted.out_of_order);

        let order: Vec<i64> = std::iter::from_fn(|| queue.pop_front().map(|f| f.ts)).collect();
        assert_eq!(order, vec![5, 10, 30, 50]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut queue = FrameQueue::default();
        queue.insert(JitterFrame {
            data: 1,
            ts: 10,
            ms: 0,
            kind: FrameKind::Control,
        });
        queue.insert(JitterFrame {
            data: 2,
            ts: 10,
            ms: 0,
            kind: FrameKind::Control,
        });
        assert_eq!(queue.pop_front().map(|f| f.data), Some(1));
        assert_eq!(queue.pop_front().map(|f| f.data), Some(2));
    }

    #[test]
    fn test_pop_due() {
        let mut queue = FrameQueue::default();
        queue.insert(frame(100));
        assert!(queue.pop_due(99).is_none());
        assert_eq!(queue.pop_due(100).map(|f| f.ts), Some(100));
        assert!(queue.is_empty());
    }
}
