//! Global mean response time (GMRT) roller.
//!
//! An arithmetic mean of observed reply latencies over a sliding window
//! of one-second buckets. Samples landing in the same second sum into one
//! bucket; when the clock rolls into a new second the oldest bucket is
//! discarded. The roller is seeded with one synthetic sample so the very
//! first searches get a sane next-probe delay, and it re-seeds itself if
//! the whole window ever drains (the mean divides the response-time
//! ratio, so it must never be zero-for-lack-of-data).

/// One second's worth of samples.
#[derive(Clone, Copy, Default)]
struct Bucket {
    sum: u64,
    count: u32,
}

/// Rolling mean of reply latencies in milliseconds.
pub struct GmrtRoller {
    buckets: Vec<Bucket>,
    /// Index of the bucket accumulating the current second.
    head: usize,
    /// Second stamp of the head bucket.
    current_sec: u64,
    total_sum: u64,
    total_count: u64,
    initial_millis: u32,
}

impl GmrtRoller {
    /// Create a roller over `window_seconds` buckets, seeded with one
    /// synthetic `initial_millis` sample at `now_ms`.
    pub fn new(window_seconds: usize, initial_millis: u32, now_ms: u64) -> Self {
        let window = window_seconds.max(1);
        let mut roller = Self {
            buckets: vec![Bucket::default(); window],
            head: 0,
            current_sec: now_ms / 1000,
            total_sum: 0,
            total_count: 0,
            initial_millis: initial_millis.max(1),
        };
        roller.seed();
        roller
    }

    /// Fold one latency sample in and return the updated mean.
    pub fn update(&mut self, now_ms: u64, sample_ms: u32) -> u32 {
        self.advance(now_ms);
        if let Some(bucket) = self.buckets.get_mut(self.head) {
            bucket.sum += u64::from(sample_ms);
            bucket.count += 1;
        }
        self.total_sum += u64::from(sample_ms);
        self.total_count += 1;
        self.current()
    }

    /// The mean over the window as of the last update.
    pub fn current(&self) -> u32 {
        let count = self.total_count.max(1);
        u32::try_from(self.total_sum / count).unwrap_or(u32::MAX)
    }

    /// Rotate buckets so the head covers the second containing `now_ms`.
    fn advance(&mut self, now_ms: u64) {
        let sec = now_ms / 1000;
        if sec <= self.current_sec {
            return;
        }
        let window = self.buckets.len() as u64;
        let steps = (sec - self.current_sec).min(window);
        for _ in 0..steps {
            self.head = (self.head + 1) % self.buckets.len();
            if let Some(bucket) = self.buckets.get_mut(self.head) {
                self.total_sum -= bucket.sum;
                self.total_count -= u64::from(bucket.count);
                *bucket = Bucket::default();
            }
        }
        self.current_sec = sec;
        if self.total_count == 0 {
            self.seed();
        }
    }

    /// Place the synthetic sample into the head bucket.
    fn seed(&mut self) {
        if let Some(bucket) = self.buckets.get_mut(self.head) {
            bucket.sum += u64::from(self.initial_millis);
            bucket.count += 1;
        }
        self.total_sum += u64::from(self.initial_millis);
        self.total_count += 1;
    }
}
