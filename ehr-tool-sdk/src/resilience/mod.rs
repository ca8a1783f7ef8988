//! Resilience patterns for the EHR client
//!
//! - Bounded retry budget with exponential backoff
//! - Injectable sleeping so retry timing can be observed in tests

mod retry;

pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
