//! # Gym Runtime
//!
//! Concurrency and operations infrastructure for the gym reservation engine.
//!
//! Nothing in this crate knows about sessions or reservations. It provides the
//! generic pieces the engine's facade is built from.
//!
//! ## Components
//!
//! - **Keyed locks**: one async mutex per key with deadline-bounded acquisition
//! - **Retry**: exponential backoff with jitter for transient contention
//! - **Metrics**: metric names, recorders and a Prometheus exporter
//!
//! ## Example
//!
//! ```rust
//! use gym_runtime::locks::{KeyedLocks, LockError};
//! use gym_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let locks: KeyedLocks<u64> = KeyedLocks::new("session");
//! let policy = RetryPolicy::default();
//!
//! let guard = retry_with_predicate(
//!     &policy,
//!     || locks.acquire(1, Duration::from_millis(50)),
//!     |_: &LockError| true,
//! )
//! .await;
//! assert!(guard.is_ok());
//! # }
//! ```

/// Keyed async locks with bounded acquisition
pub mod locks;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use locks::{KeyGuard, KeyedLocks, LockError};
pub use retry::{RetryError, RetryPolicy, retry_with_predicate};
