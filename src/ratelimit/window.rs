//! Sliding window counter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::admission::EventCounter;
use super::breaker::CircuitBreaker;
use crate::error::{Result, TurnstileError};

/// Bucket ring shared between the counter handle and its rotation task.
#[derive(Debug)]
struct WindowState {
    /// Event counts, one per time slot
    buckets: Vec<i64>,
    /// Index of the bucket representing "now"
    pos: usize,
    /// Number of buckets holding data observed since start
    size: usize,
}

impl WindowState {
    fn new(num_buckets: usize) -> Self {
        Self {
            buckets: vec![0; num_buckets],
            pos: 0,
            size: 1,
        }
    }

    /// Move to the next bucket, discarding what it held one full window ago.
    fn advance(&mut self) {
        let len = self.buckets.len();
        self.pos = (self.pos + 1) % len;
        self.buckets[self.pos] = 0;

        if self.size < len {
            self.size += 1;
        }
    }

    fn add(&mut self, amount: i64) {
        let bucket = &mut self.buckets[self.pos];
        *bucket = bucket.saturating_add(amount);
    }

    fn last(&self, n: usize) -> i64 {
        let len = self.buckets.len();
        let n = n.min(self.size);

        (0..n)
            .map(|i| self.buckets[(len + self.pos - i) % len])
            .fold(0i64, |total, count| total.saturating_add(count))
    }

    /// Load seed counts into successive buckets, leaving `pos` on the last one.
    fn fill(&mut self, seeds: &[i64]) {
        for (i, &seed) in seeds.iter().enumerate() {
            self.add(seed);
            if i != seeds.len() - 1 {
                self.advance();
            }
        }
    }
}

/// A sliding window event counter made of a fixed ring of time buckets.
///
/// The window is split into `num_buckets` buckets of equal duration. A
/// background task advances the current bucket once per bucket duration and
/// clears it, so the sum over the ring always covers the most recent window.
/// The bucket being written is always counted in full, even though only part
/// of its duration has elapsed.
///
/// All reads and writes go through a single lock, so an increment is never
/// lost and a query never observes a rotation half-applied.
///
/// The rotation runs until [`stop`](Self::stop) is called or the counter is
/// dropped.
pub struct SlidingWindowCounter {
    /// Total span covered by the ring
    window: Duration,
    /// Span covered by a single bucket
    bucket_duration: Duration,
    /// Number of buckets in the ring
    num_buckets: usize,
    /// Event count at which the limit opens
    threshold: i64,
    /// Bucket ring, shared with the rotation task
    state: Arc<RwLock<WindowState>>,
    /// One-shot stop signal for the rotation task
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// The rotation task
    rotation: JoinHandle<()>,
}

impl std::fmt::Debug for SlidingWindowCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowCounter")
            .field("window", &self.window)
            .field("bucket_duration", &self.bucket_duration)
            .field("num_buckets", &self.num_buckets)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl SlidingWindowCounter {
    /// Create a counter and start its bucket rotation.
    ///
    /// `window` must be non-zero, larger than `num_buckets` nanoseconds and an
    /// exact multiple of `num_buckets` nanoseconds.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(window: Duration, num_buckets: usize, threshold: i64) -> Result<Self> {
        Self::start_seeded(window, num_buckets, threshold, &[])
    }

    /// Create a counter whose history is pre-loaded with `seeds`, then start
    /// its bucket rotation.
    ///
    /// Each seed lands in its own bucket, oldest first; the last seed ends up
    /// in the current bucket.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start_seeded(
        window: Duration,
        num_buckets: usize,
        threshold: i64,
        seeds: &[i64],
    ) -> Result<Self> {
        let bucket_duration = bucket_duration(window, num_buckets)?;

        let mut state = WindowState::new(num_buckets);
        state.fill(seeds);
        let state = Arc::new(RwLock::new(state));

        let (stop_tx, stop_rx) = oneshot::channel();
        let first_tick = Instant::now() + bucket_duration;
        let rotation = tokio::spawn(rotate(state.clone(), first_tick, bucket_duration, stop_rx));

        debug!(
            window = ?window,
            bucket_duration = ?bucket_duration,
            num_buckets = num_buckets,
            threshold = threshold,
            seeded = seeds.len(),
            "Started sliding window counter"
        );

        Ok(Self {
            window,
            bucket_duration,
            num_buckets,
            threshold,
            state,
            stop_tx: Mutex::new(Some(stop_tx)),
            rotation,
        })
    }

    /// Record a single event in the current bucket.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Record `amount` events in the current bucket.
    pub fn add(&self, amount: i64) {
        self.state.write().add(amount);
    }

    /// Sum the most recent `n` buckets, including the current one.
    ///
    /// `n` is clamped to the number of buckets observed since start, so a
    /// window that has not yet warmed up never reads slots that have not
    /// elapsed.
    pub fn last(&self, n: usize) -> i64 {
        if n == 0 {
            return 0;
        }
        self.state.read().last(n)
    }

    /// Sum of all events over the observed window.
    pub fn count(&self) -> i64 {
        self.last(self.num_buckets)
    }

    /// Stop the bucket rotation.
    ///
    /// Buckets stop advancing; later events keep landing in the bucket that
    /// was current when the rotation stopped. Calling this more than once has
    /// no further effect.
    pub fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
            debug!(window = ?self.window, "Stop requested for sliding window counter");
        }
    }

    /// Whether the rotation task has finished.
    pub fn is_stopped(&self) -> bool {
        self.rotation.is_finished()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

impl CircuitBreaker for SlidingWindowCounter {
    fn is_open(&self) -> bool {
        self.count() >= self.threshold
    }
}

impl EventCounter for SlidingWindowCounter {
    fn increment(&self) {
        SlidingWindowCounter::increment(self);
    }

    fn count(&self) -> i64 {
        SlidingWindowCounter::count(self)
    }
}

/// Validate the window parameters and derive the duration of one bucket.
fn bucket_duration(window: Duration, num_buckets: usize) -> Result<Duration> {
    let nanos = window.as_nanos();
    if nanos == 0 {
        return Err(TurnstileError::InvalidConfiguration(
            "window duration cannot be zero".to_string(),
        ));
    }
    if num_buckets == 0 {
        return Err(TurnstileError::InvalidConfiguration(
            "number of buckets cannot be zero".to_string(),
        ));
    }

    let divisor = u32::try_from(num_buckets).map_err(|_| {
        TurnstileError::InvalidConfiguration(format!(
            "number of buckets ({}) is too large",
            num_buckets
        ))
    })?;

    if nanos <= u128::from(divisor) || nanos % u128::from(divisor) != 0 {
        return Err(TurnstileError::InvalidConfiguration(format!(
            "window duration ({:?}) has to be a multiple of, and larger than, the number of buckets ({})",
            window, num_buckets
        )));
    }

    Ok(window / divisor)
}

/// Advance the bucket ring once per bucket duration until stopped.
///
/// The loop also ends when the stop sender is dropped along with its counter.
async fn rotate(
    state: Arc<RwLock<WindowState>>,
    first_tick: Instant,
    bucket_duration: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(first_tick, bucket_duration);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pos = {
                    let mut state = state.write();
                    state.advance();
                    state.pos
                };
                trace!(pos = pos, "Advanced to next bucket");
            }
            _ = &mut stop_rx => {
                debug!("Bucket rotation stopped");
                break;
            }
        }
    }
}
