//! Deterministic test harness for Parley.
//!
//! Virtual-time [`parley_core::Environment`] and an in-memory
//! [`parley_client::ChatApi`] backend, so cache expiry, eviction order, and
//! optimistic-send reconciliation can be tested without a clock or a server.
//!
//! # Invariant Testing
//!
//! The `invariants` module extracts a [`StoreSnapshot`] from a room store and
//! checks properties that must hold after every operation. Use
//! [`InvariantRegistry::standard()`] for the room store invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod mock_api;
pub mod sim_env;

pub use invariants::{
    CapacityBound, Invariant, InvariantRegistry, InvariantResult, RoomSnapshot, StoreSnapshot,
    UniqueListing, UniqueMembers, UniqueMessageIds, Violation,
};
pub use mock_api::MockChatApi;
pub use sim_env::{SimEnv, SimInstant};
