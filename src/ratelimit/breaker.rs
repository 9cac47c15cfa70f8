//! Breaker state surface for admission limits.

use std::fmt;

/// State of a limit.
///
/// `Open` means the limit has been reached and callers should throttle;
/// `Closed` is the default, healthy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    /// The limit has been reached
    Open,
    /// Events are below the limit
    Closed,
}

impl BreakerState {
    /// Map an "is open" flag to a state.
    pub fn from_open(open: bool) -> Self {
        if open {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, BreakerState::Open)
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Open => write!(f, "open"),
            BreakerState::Closed => write!(f, "closed"),
        }
    }
}

/// Trait for limits that can trip open.
///
/// Implementors only decide whether they are open; the closed check and the
/// state value are derived from that.
pub trait CircuitBreaker: Send + Sync {
    /// Returns `true` if the limit has been reached.
    fn is_open(&self) -> bool;

    /// Returns `true` if the limit has not been reached.
    fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Current state of the limit.
    fn state(&self) -> BreakerState {
        BreakerState::from_open(self.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Switch(AtomicBool);

    impl CircuitBreaker for Switch {
        fn is_open(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BreakerState::Open.to_string(), "open");
        assert_eq!(BreakerState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_from_open() {
        assert_eq!(BreakerState::from_open(true), BreakerState::Open);
        assert_eq!(BreakerState::from_open(false), BreakerState::Closed);
        assert!(BreakerState::Open.is_open());
        assert!(!BreakerState::Closed.is_open());
    }

    #[test]
    fn test_default_methods_follow_is_open() {
        let switch = Switch(AtomicBool::new(false));
        assert!(switch.is_closed());
        assert_eq!(switch.state(), BreakerState::Closed);

        switch.0.store(true, Ordering::SeqCst);
        assert!(!switch.is_closed());
        assert_eq!(switch.state(), BreakerState::Open);
    }
}
