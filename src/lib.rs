//! Turnstile - Sliding Window Rate Limiting
//!
//! This crate implements a sliding window rate limiting counter: a fixed ring
//! of time buckets that tracks recent event counts and decides whether a limit
//! has been reached. A background task rotates the ring for the lifetime of
//! the counter.

pub mod config;
pub mod error;
pub mod ratelimit;
