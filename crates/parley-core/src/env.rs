//! Time and randomness, injected.
//!
//! Cache staleness, reconnect backoff, and optimistic message IDs all read
//! from an [`Environment`] instead of the OS, so tests can run them on a
//! virtual clock with a seeded RNG.

use std::{fmt::Debug, future::Future, ops::Sub, time::Duration};

/// Source of time and randomness for the client.
///
/// # Invariants
///
/// - `now()` is monotonic: a later call never returns an earlier instant
/// - No method fails short of the OS refusing entropy
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time. Subtracting two instants gives the elapsed duration.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Future that completes after `duration`.
    ///
    /// Only the transport driver awaits this, to arm reconnect timers. The
    /// state machine and the caches never sleep.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`, seed for client-assigned message IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
