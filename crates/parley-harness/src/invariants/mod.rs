//! Room store invariants.
//!
//! A check looks only at a [`StoreSnapshot`], never at the store itself, so
//! the same checks run from unit tests, proptest sequences, and fuzz targets
//! without borrowing the store across an operation.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&StoreSnapshot::from_store(&store), "after eviction");
//! ```

mod checks;
mod snapshot;

use std::fmt;

use parley_cache::RoomId;

pub use checks::{CapacityBound, UniqueListing, UniqueMembers, UniqueMessageIds};
pub use snapshot::{RoomSnapshot, StoreSnapshot};

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which check failed
    pub invariant: &'static str,
    /// Room the failure was found in, for per-room checks
    pub room: Option<RoomId>,
    /// What was observed
    pub message: String,
}

impl Violation {
    /// Store-wide violation.
    pub fn store(invariant: &'static str, message: impl Into<String>) -> Self {
        Self { invariant, room: None, message: message.into() }
    }

    /// Violation inside one cached room.
    pub fn in_room(invariant: &'static str, room: RoomId, message: impl Into<String>) -> Self {
        Self { invariant, room: Some(room), message: message.into() }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.room {
            Some(room) => write!(f, "[{}] room {room}: {}", self.invariant, self.message),
            None => write!(f, "[{}] {}", self.invariant, self.message),
        }
    }
}

impl std::error::Error for Violation {}

/// A property of the store that holds after every operation.
pub trait Invariant: Send + Sync {
    /// Short snake_case name used in reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`.
    fn check(&self, state: &StoreSnapshot) -> InvariantResult;
}

/// Ordered set of invariants run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InvariantRegistry {
    /// No checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity bound plus the three uniqueness checks.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(CapacityBound);
        registry.add(UniqueMessageIds);
        registry.add(UniqueMembers);
        registry.add(UniqueListing);
        registry
    }

    /// Register another check. Checks run in registration order.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.checks.push(Box::new(invariant));
    }

    /// Names of the registered checks.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|check| check.name())
    }

    /// Run every check. On failure returns all violations, not just the
    /// first.
    pub fn check_all(&self, state: &StoreSnapshot) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        for check in &self.checks {
            if let Err(violation) = check.check(state) {
                violations.push(violation);
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// [`InvariantRegistry::check_all`], panicking with a report on failure.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &StoreSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };

        let mut report = format!("store invariants broken {context}:");
        for violation in &violations {
            report.push_str("\n  ");
            report.push_str(&violation.to_string());
        }
        panic!("{report}");
    }

    /// How many checks are registered.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
