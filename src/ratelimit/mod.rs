//! Rate limiting logic and state management.

mod admission;
mod breaker;
mod window;

pub use admission::{admit, Admission, EventCounter};
pub use breaker::{BreakerState, CircuitBreaker};
pub use window::SlidingWindowCounter;
