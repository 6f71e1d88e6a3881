//! WebSocket driver for the connection state machine.
//!
//! [`TransportSocket`] is a handle to a tokio task that owns a
//! [`parley_core::Connection`] and executes its actions: it opens and closes
//! WebSocket links, writes outbound frames, arms the reconnect timer, and
//! dispatches inbound events to subscribers.
//!
//! # Architecture
//!
//! ```text
//! TransportSocket ──commands──▶ driver task ──frames──▶ link task ──▶ server
//!                                  ▲  │
//!                       link events│  └──▶ Subscribers
//! ```
//!
//! Each link task owns exactly one WebSocket and reports open, frames, and
//! close tagged with its socket ID. The state machine ignores reports from
//! links it has already replaced.

use std::{future::Future, pin::Pin};

use futures::{SinkExt, StreamExt};
use parley_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionError, ConnectionState, Environment,
    HandlerResult, InboundFrame, Notification, OutboundMessage, SocketId, Subscribers, Subscription,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::{credentials::CredentialProvider, error::TransportError};

type ReconnectTimer = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// WebSocket endpoint, e.g. `ws://host/ws`
    pub url: String,
    /// Reconnection policy
    pub connection: ConnectionConfig,
}

impl From<&crate::ClientConfig> for SocketConfig {
    fn from(config: &crate::ClientConfig) -> Self {
        Self { url: config.server_url.clone(), connection: config.connection.clone() }
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send(OutboundMessage),
}

#[derive(Debug)]
enum LinkEvent {
    Opened(SocketId),
    Frame(SocketId, String),
    Closed(SocketId, String),
}

/// A running link task and its outbound channel.
struct Link {
    socket: SocketId,
    outbound: mpsc::UnboundedSender<WsMessage>,
    task: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handle to a reconnecting, authenticating WebSocket connection.
///
/// Dropping the handle stops the driver and closes any open link.
#[derive(Debug)]
pub struct TransportSocket {
    commands: mpsc::UnboundedSender<Command>,
    subscribers: Subscribers,
    state: watch::Receiver<ConnectionState>,
    last_error: watch::Receiver<Option<ConnectionError>>,
    task: JoinHandle<()>,
}

impl TransportSocket {
    /// Spawn the driver task. The connection starts `Disconnected`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<E, C>(config: SocketConfig, env: E, credentials: C) -> Self
    where
        E: Environment,
        C: CredentialProvider + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (error_tx, last_error) = watch::channel(None);
        let subscribers = Subscribers::new();

        let driver = Driver {
            url: config.url,
            connection: Connection::new(config.connection),
            env,
            credentials,
            subscribers: subscribers.clone(),
            state_tx,
            error_tx,
            link_tx,
            link: None,
            reconnect: None,
        };
        let task = tokio::spawn(driver.run(command_rx, link_rx));

        Self { commands, subscribers, state, last_error, task }
    }

    /// Start connecting. No-op if already connecting or connected.
    pub fn connect(&self) -> Result<(), TransportError> {
        self.command(Command::Connect)
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) -> Result<(), TransportError> {
        self.command(Command::Disconnect)
    }

    /// Send immediately if connected, or queue for delivery once the
    /// handshake in progress succeeds. While disconnected or still opening
    /// the socket the message is dropped with a warning.
    ///
    /// The auth request is the exception: it goes out on any live socket.
    pub fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.command(Command::Send(message))
    }

    /// Register a handler for inbound events and give-up notifications.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    /// Last published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Why the connection last failed or refused to start, cleared on
    /// successful authentication.
    ///
    /// `AuthRejected` and `MissingCredential` mean retrying is pointless
    /// until the caller supplies a fresh credential and calls `connect()`.
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.last_error.borrow().clone()
    }

    /// Receiver that observes every change of [`TransportSocket::last_error`].
    pub fn watch_last_error(&self) -> watch::Receiver<Option<ConnectionError>> {
        self.last_error.clone()
    }

    fn command(&self, command: Command) -> Result<(), TransportError> {
        self.commands.send(command).map_err(|_| TransportError::Shutdown)
    }
}

impl Drop for TransportSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver<E: Environment, C> {
    url: String,
    connection: Connection,
    env: E,
    credentials: C,
    subscribers: Subscribers,
    state_tx: watch::Sender<ConnectionState>,
    error_tx: watch::Sender<Option<ConnectionError>>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link: Option<Link>,
    reconnect: Option<ReconnectTimer>,
}

impl<E: Environment, C: CredentialProvider> Driver<E, C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut links: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        loop {
            let actions = tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command)
                },
                Some(event) = links.recv() => self.handle_link_event(event),
                () = wait_for(&mut self.reconnect) => {
                    self.reconnect = None;
                    let token = self.credentials.token();
                    self.connection.handle_reconnect_timer(token.as_deref())
                },
            };

            self.execute(actions);
            self.publish();
        }

        // Every handle is gone
        let actions = self.connection.disconnect();
        self.execute(actions);
        tracing::debug!("transport driver stopped");
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.connection.state());

        let latest = self.connection.last_error();
        self.error_tx.send_if_modified(|current| {
            if current.as_ref() == latest {
                return false;
            }
            *current = latest.cloned();
            true
        });
    }

    fn handle_command(&mut self, command: Command) -> Vec<ConnectionAction> {
        match command {
            Command::Connect => {
                let token = self.credentials.token();
                self.connection.connect(token.as_deref())
            },
            Command::Disconnect => self.connection.disconnect(),
            Command::Send(message) => self.connection.send(message),
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) -> Vec<ConnectionAction> {
        match event {
            LinkEvent::Opened(socket) => self.connection.handle_open(socket),
            LinkEvent::Frame(socket, text) => match InboundFrame::parse(&text) {
                Ok(frame) => self.connection.handle_frame(socket, frame),
                Err(e) => {
                    tracing::warn!(socket, error = %e, "dropping undecodable frame");
                    Vec::new()
                },
            },
            LinkEvent::Closed(socket, reason) => {
                if self.link.as_ref().is_some_and(|link| link.socket == socket) {
                    self.link = None;
                }
                self.connection.handle_closed(socket, &reason)
            },
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::Open { socket } => {
                    let (outbound, outbound_rx) = mpsc::unbounded_channel();
                    let task = tokio::spawn(run_link(
                        socket,
                        self.url.clone(),
                        outbound_rx,
                        self.link_tx.clone(),
                    ));
                    // Replacing the link aborts any previous one
                    self.link = Some(Link { socket, outbound, task });
                },
                ConnectionAction::Close { socket, reason } => {
                    if self.link.as_ref().is_some_and(|link| link.socket == socket) {
                        tracing::debug!(socket, %reason, "closing link");
                        self.link = None;
                    }
                },
                ConnectionAction::Transmit { socket, message } => match &self.link {
                    Some(link) if link.socket == socket => {
                        if link.outbound.send(WsMessage::text(message.to_text())).is_err() {
                            tracing::warn!(socket, "link gone, outbound frame dropped");
                        }
                    },
                    _ => tracing::warn!(socket, "no live link, outbound frame dropped"),
                },
                ConnectionAction::Deliver(event) => {
                    self.subscribers.dispatch(&Notification::Event(event));
                },
                ConnectionAction::ScheduleReconnect { attempt, delay } => {
                    tracing::debug!(attempt, ?delay, "reconnect scheduled");
                    self.reconnect = Some(Box::pin(self.env.sleep(delay)));
                },
                ConnectionAction::CancelReconnect => {
                    self.reconnect = None;
                },
                ConnectionAction::GiveUp { attempts } => {
                    self.reconnect = None;
                    self.subscribers.dispatch(&Notification::ReconnectExhausted { attempts });
                },
            }
        }
    }
}

async fn wait_for(timer: &mut Option<ReconnectTimer>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Own one WebSocket until it closes or the driver drops the outbound sender.
async fn run_link(
    socket: SocketId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(socket, error = %e, "websocket connect failed");
            let _ = events.send(LinkEvent::Closed(socket, e.to_string()));
            return;
        },
    };
    let _ = events.send(LinkEvent::Opened(socket));

    let (mut write, mut read) = stream.split();
    let reason = loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break e.to_string();
                    }
                },
                None => {
                    let _ = write.close().await;
                    break "closed locally".to_string();
                },
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(LinkEvent::Frame(socket, text.as_str().to_owned()));
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| f.reason.as_str().to_owned(),
                    );
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    let _ = events.send(LinkEvent::Closed(socket, reason));
}
