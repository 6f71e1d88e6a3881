//! Virtual-time environment.
//!
//! Time starts at zero and only moves when a test calls [`SimEnv::advance`]
//! or awaits [`Environment::sleep`], which jumps the clock forward instead of
//! waiting. Randomness comes from a seeded ChaCha8 stream, so a given seed
//! always yields the same local message IDs.

use std::{
    ops::Sub,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Point on the virtual timeline, measured from the start of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Start of the timeline.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Instant `millis` milliseconds after the start.
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Time since the start of the timeline.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Deterministic environment for tests.
///
/// Clones share the same clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment at time zero with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment at time zero with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        *lock(&self.clock) += duration;
    }

    /// Move the clock forward to `instant`. Earlier instants are ignored.
    pub fn advance_to(&self, instant: SimInstant) {
        let mut clock = lock(&self.clock);
        if instant.0 > *clock {
            *clock = instant.0;
        }
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(*lock(&self.clock))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send + 'static {
        let clock = Arc::clone(&self.clock);
        async move {
            *lock(&clock) += duration;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        lock(&self.rng).fill_bytes(buffer);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
