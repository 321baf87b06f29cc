//! Core entropy trait for the vissim seed manager.

/// The source from which fresh component seeds are drawn.
///
/// This trait abstracts the "where does randomness come from" question so
/// that the seed manager can run both in production (seeds derived from the
/// wall clock) and under test (seeds derived from a fixed master seed).
///
/// # Implementations
///
/// - **Production**: `WallClockEntropy` - ChaCha8 seeded from the system clock
/// - **Deterministic**: `SeededEntropy` - ChaCha8 seeded from a master seed
///
/// # Determinism
///
/// The seeds handed out by an implementation are only ever *stored*, never
/// used to replay the source itself. Reproducing a simulation therefore only
/// requires the seed table, not the entropy source.
pub trait EntropySource: Send + 'static {
    /// Draws a fresh 32-bit seed.
    ///
    /// Called once per (component, key) pair the first time that pair is
    /// requested; the result is memoized by the caller.
    fn fresh_seed(&mut self) -> u32;

    /// Returns the master seed (for logging/debugging).
    ///
    /// In production, returns `None` (not seeded).
    /// In deterministic mode, returns the master seed.
    fn master_seed(&self) -> Option<u64>;
}

impl EntropySource for Box<dyn EntropySource> {
    fn fresh_seed(&mut self) -> u32 {
        (**self).fresh_seed()
    }

    fn master_seed(&self) -> Option<u64> {
        (**self).master_seed()
    }
}
