//! vissim Entropy Abstraction Layer
//!
//! This crate provides the abstraction that lets the vissim seed manager
//! draw fresh component seeds either from the **wall clock** (production) or
//! from a **fixed master seed** (tests, reproducible CLI runs).
//!
//! # Core Concept
//!
//! A simulation never stores random draws, only the seeds that produced them.
//! The entropy source is consulted exactly once per (component, key) pair;
//! everything downstream is replayed from the memoized seed.
//!
//! # Example
//!
//! ```
//! use vissim_env::{EntropySource, SeededEntropy};
//!
//! let mut a = SeededEntropy::new(42);
//! let mut b = SeededEntropy::new(42);
//! assert_eq!(a.fresh_seed(), b.fresh_seed());
//! ```

mod clock_impl;
mod context;
mod error;
mod seeded;

pub use clock_impl::WallClockEntropy;
pub use context::EntropySource;
pub use error::EnvError;
pub use seeded::SeededEntropy;
