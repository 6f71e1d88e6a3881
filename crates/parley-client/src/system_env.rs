//! Production Environment implementation using system time and RNG.

use std::time::Duration;

use parley_core::Environment;

/// Production environment.
///
/// Uses `std::time::Instant::now()` for time, `tokio::time::sleep()` for
/// reconnect timers, and getrandom for local message IDs.
///
/// # Panics
///
/// Panics if the OS RNG fails. RNG failure indicates OS-level breakage the
/// client cannot recover from.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send + 'static {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
