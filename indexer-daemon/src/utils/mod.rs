//! Utility modules for indexer-daemon

pub mod retry;

pub use retry::{retry_fixed_delay, RetryExhausted, RetryPolicy};
