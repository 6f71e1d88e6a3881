//! Parley client
//!
//! Real-time synchronization layer for the Parley chat client. Ties the
//! Sans-IO [`parley_core`] connection and the [`parley_cache`] stores to the
//! outside world.
//!
//! # Architecture
//!
//! Inbound socket events flow through the [`EventRouter`] into the room cache;
//! user actions go through [`ChatStore`], which writes optimistically, calls
//! the [`ChatApi`] collaborator, and reconciles or rolls back on the result.
//!
//! # Components
//!
//! - [`EventRouter`]: maps inbound events to cache mutations
//! - [`ChatStore`]: read-through/write-through facade over the caches
//! - [`ChatApi`]: REST collaborator interface
//! - [`CredentialProvider`]: source of the auth token
//! - [`SystemEnv`]: production [`parley_core::Environment`]
//!
//! # Transport (optional)
//!
//! With the `transport` feature (default), this crate also provides
//! [`transport::TransportSocket`], a tokio driver running the connection
//! state machine over a WebSocket.

#![forbid(unsafe_code)]

mod api;
mod config;
mod credentials;
mod error;
mod router;
mod store;
mod system_env;

#[cfg(feature = "transport")]
pub mod transport;

pub use api::{ApiError, ChatApi};
pub use config::{ClientConfig, DEFAULT_MESSAGE_TTL, DEFAULT_SERVER_URL, DEFAULT_SESSION_TTL};
pub use credentials::{CredentialProvider, StaticToken};
pub use error::{ClientError, TransportError};
pub use router::{EventRouter, RoomEvent, RouteOutcome};
pub use store::{ChatStore, PendingSend};
pub use system_env::SystemEnv;
