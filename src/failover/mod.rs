//! Failure classification and retry.
//!
//! [`classify`] turns a provider error into a [`FailoverReason`];
//! [`with_retry`] drives an operation through exponential backoff, retrying
//! only what the classifier considers transient.

pub mod classifier;
pub mod retry;
pub mod types;

pub use classifier::{classify, classify_message, classify_status, is_retryable, is_retryable_error};
pub use retry::{RetryEvent, RetryObserver, RetryOptions, with_retry};
pub use types::{FailoverError, FailoverReason};
