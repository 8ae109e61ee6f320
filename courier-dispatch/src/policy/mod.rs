//! Policy abstractions for dispatch.
//!
//! - [`RetryPolicy`]: attempts per provider and the backoff between them

pub mod retry;

pub use retry::RetryPolicy;
