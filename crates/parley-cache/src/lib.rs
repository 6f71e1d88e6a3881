//! Parley cache
//!
//! In-memory client caches for the Parley chat client.
//!
//! # Components
//!
//! - [`EntityCache`]: generic TTL key/value store for read-through caching of
//!   fetched collections (sessions, per-session messages)
//! - [`RoomCacheStore`]: per-room cache of metadata, messages, and members,
//!   bounded to a fixed number of rooms with oldest-fetch eviction, plus the
//!   top-level room listing
//! - [`model`]: the domain types both caches hold
//!
//! All operations are synchronous. Time comes from a
//! [`parley_core::Environment`] so staleness and eviction are deterministic
//! under test.

#![forbid(unsafe_code)]

mod entity_cache;
mod error;
pub mod model;
mod room_store;

pub use entity_cache::EntityCache;
pub use error::CacheError;
pub use model::{
    Member, Message, MessageDraft, MessageId, MessageKind, MessagePatch, Reaction, RoomId,
    RoomMetadata, RoomPatch, RoomSummary, RoomSummaryPatch, Session, SessionId, UserId,
};
pub use room_store::{
    DEFAULT_MAX_CACHED_ROOMS, DEFAULT_STALE_AFTER, RoomCacheEntry, RoomCacheStore,
    RoomStoreConfig, StoreChange,
};
