//! Delay history with percentile-trimmed extremes.

/// Fixed-size sorted array keeping the `N` most extreme values offered.
///
/// `descending` keeps the largest values (index 0 is the maximum); otherwise
/// the smallest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Extremes<const N: usize> {
    values: [i64; N],
    descending: bool,
}

impl<const N: usize> Extremes<N> {
    pub(crate) fn highest() -> Self {
        Self {
            values: [i64::MIN; N],
            descending: true,
        }
    }

    pub(crate) fn lowest() -> Self {
        Self {
            values: [i64::MAX; N],
            descending: false,
        }
    }

    fn sentinel(&self) -> i64 {
        if self.descending { i64::MIN } else { i64::MAX }
    }

    fn beats(&self, a: i64, b: i64) -> bool {
        if self.descending { a > b } else { a < b }
    }

    pub(crate) fn clear(&mut self) {
        self.values = [self.sentinel(); N];
    }

    /// Insert `value` if it ranks among the kept extremes.
    pub(crate) fn offer(&mut self, value: i64) {
        if N == 0 || !self.beats(value, self.values[N - 1]) {
            return;
        }
        let mut pos = N - 1;
        while pos > 0 && self.beats(value, self.values[pos - 1]) {
            self.values[pos] = self.values[pos - 1];
            pos -= 1;
        }
        self.values[pos] = value;
    }

    pub(crate) fn get(&self, index: usize) -> i64 {
        self.values[index.min(N.saturating_sub(1))]
    }

    /// Least extreme kept value.
    pub(crate) fn last(&self) -> i64 {
        self.get(N.saturating_sub(1))
    }
}

/// Ring of the last `CAP` delay samples with the `KEEP` highest and lowest
/// tracked for a trimmed jitter estimate.
///
/// The extremes are recomputed lazily: a push only invalidates them when
/// the new or evicted sample could change either end.
#[derive(Debug, Clone)]
pub struct DelayHistory<const CAP: usize, const KEEP: usize> {
    samples: Box<[i64; CAP]>,
    /// Total samples ever pushed since the last reset.
    count: u64,
    max: Extremes<KEEP>,
    min: Extremes<KEEP>,
    valid: bool,
}

impl<const CAP: usize, const KEEP: usize> Default for DelayHistory<CAP, KEEP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize, const KEEP: usize> DelayHistory<CAP, KEEP> {
    /// Empty history.
    pub fn new() -> Self {
        Self {
            samples: Box::new([0; CAP]),
            count: 0,
            max: Extremes::highest(),
            min: Extremes::lowest(),
            valid: false,
        }
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.count = 0;
        self.valid = false;
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        (self.count as usize).min(CAP)
    }

    /// Whether no sample has been pushed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Record a delay sample, evicting the oldest once full.
    pub fn push(&mut self, delay: i64) {
        let slot = (self.count % CAP as u64) as usize;
        let kicked = self.samples[slot];
        let full = self.count >= CAP as u64;
        self.samples[slot] = delay;
        self.count += 1;

        if !self.valid {
            return;
        }
        // Samples only accumulate until the ring fills, so any new value
        // could belong to the extremes then.
        if !full
            || delay < self.min.last()
            || delay > self.max.last()
            || kicked <= self.min.last()
            || kicked >= self.max.last()
        {
            self.valid = false;
        }
    }

    fn recalc(&mut self) {
        self.max.clear();
        self.min.clear();
        for &sample in &self.samples[..self.len()] {
            self.max.offer(sample);
            self.min.offer(sample);
        }
        self.valid = true;
    }

    /// Trimmed `(minimum, jitter)` of the held samples.
    ///
    /// The top and bottom `KEEP/CAP` fraction of samples is discarded before
    /// taking the extremes.
    pub fn stats(&mut self) -> (i64, i64) {
        if self.count == 0 {
            return (0, 0);
        }
        if !self.valid {
            self.recalc();
        }
        let index = (self.len() * KEEP / CAP).min(KEEP.saturating_sub(1));
        let min = self.min.get(index);
        (min, self.max.get(index) - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes_keep_order() {
        let mut high = Extremes::<3>::highest();
        for v in [5, 1, 9, 7, 3] {
            high.offer(v);
        }
        assert_eq!((high.get(0), high.get(1), high.get(2)), (9, 7, 5));

        let mut low = Extremes::<3>::lowest();
        for v in [5, 1, 9, 7, 3] {
            low.offer(v);
        }
        assert_eq!((low.get(0), low.get(1), low.last()), (1, 3, 5));
    }

    #[test]
    fn test_history_trims_outliers() {
        let mut history = DelayHistory::<100, 3>::new();
        for i in 0..100 {
            history.push(i % 10);
        }
        // two spikes replace the oldest samples and must be trimmed
        history.push(1000);
        history.push(-1000);

        let (min, jitter) = history.stats();
        assert_eq!(min, 0);
        assert_eq!(jitter, 9);
    }

    #[test]
    fn test_history_ring_capacity() {
        let mut history = DelayHistory::<10, 1>::new();
        for i in 0..25 {
            history.push(i);
        }
        assert_eq!(history.len(), 10);
        let (min, jitter) = history.stats();
        assert_eq!(min, 15);
        assert_eq!(jitter, 9);
    }

    #[test]
    fn test_history_lazy_invalidation() {
        let mut history = DelayHistory::<4, 1>::new();
        for v in [10, 20, 30, 40] {
            history.push(v);
        }
        assert_eq!(history.stats(), (10, 30));

        // evicts 10, the current minimum
        history.push(25);
        assert_eq!(history.stats(), (20, 20));
    }

    #[test]
    fn test_history_reset() {
        let mut history = DelayHistory::<10, 1>::new();
        history.push(3);
        history.reset();
        assert!(history.is_empty());
        assert_eq!(history.stats(), (0, 0));
    }
}
