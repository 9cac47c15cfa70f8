//! Per-request admission decisions.

use std::fmt;
use tracing::{debug, trace};

use super::breaker::CircuitBreaker;

/// Trait for counters that record events.
pub trait EventCounter: Send + Sync {
    /// Record a single event.
    fn increment(&self);

    /// Total events over the counter's window.
    fn count(&self) -> i64;
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was recorded and may proceed
    Admitted {
        /// Count after recording the request
        count: i64,
    },
    /// The limit is open; the request was not recorded
    Throttled {
        /// Count at the time of the check
        count: i64,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    /// The count reported alongside the decision.
    pub fn count(&self) -> i64 {
        match *self {
            Admission::Admitted { count } | Admission::Throttled { count } => count,
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::Admitted { count } => {
                write!(f, "Request admitted\nCurrent count is {}", count)
            }
            Admission::Throttled { count } => {
                write!(f, "Reached rate limit\nCurrent count is {}", count)
            }
        }
    }
}

/// Check the limit and record one event if it is still closed.
///
/// A throttled request is not counted, so a caller that keeps retrying does
/// not hold the limit open on its own.
pub fn admit<L>(limit: &L) -> Admission
where
    L: CircuitBreaker + EventCounter + ?Sized,
{
    if limit.is_open() {
        let count = limit.count();
        debug!(count = count, "Rate limit reached, throttling request");
        return Admission::Throttled { count };
    }

    limit.increment();
    let count = limit.count();
    trace!(count = count, "Request admitted");
    Admission::Admitted { count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::SlidingWindowCounter;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    struct FixedLimit {
        count: AtomicI64,
        limit: i64,
    }

    impl CircuitBreaker for FixedLimit {
        fn is_open(&self) -> bool {
            self.count.load(Ordering::SeqCst) >= self.limit
        }
    }

    impl EventCounter for FixedLimit {
        fn increment(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn count(&self) -> i64 {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_admit_until_limit() {
        let limit = FixedLimit {
            count: AtomicI64::new(0),
            limit: 2,
        };

        assert_eq!(admit(&limit), Admission::Admitted { count: 1 });
        assert_eq!(admit(&limit), Admission::Admitted { count: 2 });
        assert_eq!(admit(&limit), Admission::Throttled { count: 2 });

        // Throttled requests are not recorded.
        assert_eq!(limit.count(), 2);
    }

    #[test]
    fn test_admission_body() {
        let admitted = Admission::Admitted { count: 3 };
        assert!(admitted.is_admitted());
        assert_eq!(admitted.count(), 3);
        assert_eq!(admitted.to_string(), "Request admitted\nCurrent count is 3");

        let throttled = Admission::Throttled { count: 10 };
        assert!(!throttled.is_admitted());
        assert_eq!(throttled.count(), 10);
        assert_eq!(throttled.to_string(), "Reached rate limit\nCurrent count is 10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_with_sliding_window() {
        let win = assert_ok!(SlidingWindowCounter::start(Duration::from_secs(60), 60, 10));

        for i in 1..=10 {
            let admission = admit(&win);
            assert!(admission.is_admitted(), "Request {} should be admitted", i);
            assert_eq!(admission.count(), i);
        }

        assert_eq!(admit(&win), Admission::Throttled { count: 10 });
        assert_eq!(win.count(), 10);
    }
}
