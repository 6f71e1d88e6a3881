//! Parley event tail.
//!
//! Connects to the real-time channel, authenticates, and routes every inbound
//! event into a local room cache, logging what each event did.
//!
//! # Usage
//!
//! ```bash
//! # Token from the environment
//! PARLEY_TOKEN=... parley-tail --server ws://localhost:8080/ws --user-id 42
//!
//! # Verbose connection diagnostics
//! parley-tail --token ... --log-level parley_core=debug,info
//! ```

use std::time::Duration;

use clap::Parser;
use parley_cache::{RoomCacheStore, RoomStoreConfig};
use parley_client::{
    DEFAULT_SERVER_URL, EventRouter, RouteOutcome, StaticToken, SystemEnv,
    transport::{SocketConfig, TransportSocket},
};
use parley_core::{ConnectionConfig, Notification};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley real-time event tail
#[derive(Parser, Debug)]
#[command(name = "parley-tail")]
#[command(about = "Tail the Parley real-time event channel")]
#[command(version)]
struct Args {
    /// WebSocket endpoint
    #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Auth token
    #[arg(short, long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// ID of the logged-in user, for own-message detection
    #[arg(short, long, default_value = "0")]
    user_id: u64,

    /// Rooms kept in the detail cache
    #[arg(long, default_value = "5")]
    max_cached_rooms: usize,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnect_attempts: u32,

    /// Maximum reconnect delay in milliseconds
    #[arg(long, default_value = "30000")]
    max_reconnect_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let connection = ConnectionConfig {
        max_reconnect_attempts: args.max_reconnect_attempts,
        max_reconnect_delay: Duration::from_millis(args.max_reconnect_delay_ms),
        ..ConnectionConfig::default()
    };
    let rooms = RoomStoreConfig { max_cached_rooms: args.max_cached_rooms, ..Default::default() };

    let env = SystemEnv::new();
    let mut store = RoomCacheStore::new(env.clone(), rooms)?;
    store.set_listener(|change| tracing::debug!(?change, "store changed"));
    let mut router = EventRouter::new(args.user_id);

    let credentials = args.token.map_or_else(StaticToken::none, StaticToken::new);
    let socket = TransportSocket::spawn(
        SocketConfig { url: args.server.clone(), connection },
        env,
        credentials,
    );

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let _subscription = socket.on_message(move |n| tx.send(n.clone()).map_err(Into::into));
    let mut state = socket.watch_state();

    tracing::info!("Connecting to {}", args.server);
    socket.connect()?;

    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Some(Notification::Event(event)) => {
                    let outcome = router.route(&event, &mut store);
                    match outcome {
                        RouteOutcome::Unrecognized => {
                            tracing::info!(kind = event.kind(), body = %event.body(), "event");
                        },
                        RouteOutcome::RefetchMembers(room_id) => {
                            tracing::info!(room_id, "membership changed, dropping cached room");
                            store.invalidate_room(room_id);
                        },
                        outcome => tracing::info!(kind = event.kind(), ?outcome, "event routed"),
                    }
                },
                Some(Notification::ReconnectExhausted { attempts }) => {
                    tracing::error!(attempts, "server unreachable, giving up");
                    break;
                },
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = ?current, "connection state");
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                socket.disconnect()?;
                break;
            },
        }
    }

    tracing::info!(
        cached = store.len(),
        listed = store.room_list().len(),
        online = router.online_users().count(),
        "Stopped"
    );
    Ok(())
}
