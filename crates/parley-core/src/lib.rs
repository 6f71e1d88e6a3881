//! Parley core
//!
//! Sans-IO building blocks for the Parley real-time chat client: the wire
//! protocol spoken over the duplex connection, the reconnecting and
//! authenticating connection state machine, and the subscriber registry that
//! fans inbound events out to the rest of the client.
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O. [`connection::Connection`] receives
//! inputs (caller intents, socket notifications, timer fires) and returns
//! [`connection::ConnectionAction`]s for a driver to execute. The production
//! driver lives in `parley-client`; tests drive the state machine directly.
//!
//! # Components
//!
//! - [`env::Environment`]: time and randomness abstraction
//! - [`protocol`]: outbound messages, inbound frames, event kinds
//! - [`connection::Connection`]: transport state machine with backoff
//! - [`subscribers::Subscribers`]: failure-isolated handler registry

#![forbid(unsafe_code)]

pub mod connection;
pub mod env;
pub mod error;
pub mod protocol;
pub mod subscribers;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState, SocketId};
pub use env::Environment;
pub use error::{ConnectionError, ProtocolError};
pub use protocol::{InboundFrame, OutboundMessage, ServerEvent};
pub use subscribers::{HandlerError, HandlerResult, Notification, Subscribers, Subscription};
