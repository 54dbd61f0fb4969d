//! Bounded retries of transient failures.

mod executor;

pub use executor::{Attempted, Classify, RetryContext, RetryExecutor, Verdict};
