//! Fuzz target for inbound frame parsing and event routing
//!
//! # Strategy
//!
//! - Random bytes: arbitrary UTF-8 fed to the frame parser
//! - Shaped JSON: objects with a known event kind and random field values
//!
//! # Invariants
//!
//! - Parsing never panics; non-objects and missing `type` are errors
//! - Routing a parsed event never panics, whatever its payload shape
//! - Auth control frames never surface as events

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_cache::{RoomCacheStore, RoomPatch, RoomStoreConfig};
use parley_client::EventRouter;
use parley_core::{protocol::kind, InboundFrame};
use parley_harness::SimEnv;
use serde_json::{json, Value};

const KINDS: &[&str] = &[
    kind::AUTH_SUCCESS,
    kind::AUTH_ERROR,
    kind::NEW_MESSAGE,
    kind::USER_JOINED_ROOM,
    kind::USER_LEFT_ROOM,
    kind::MESSAGE_REACTED,
    kind::REACTION_REMOVED,
    kind::ROOM_CREATED,
    kind::ROOM_DELETED,
    kind::MESSAGE_READ,
    kind::USER_ONLINE,
    kind::USER_OFFLINE,
];

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Shaped { kind: u8, room_id: u8, message_id: u8, user_id: u8, text: String, numeric: bool },
}

fn shaped(kind: &str, room_id: u8, message_id: u8, user_id: u8, text: String, numeric: bool) -> Value {
    let id = if numeric { json!(message_id) } else { json!(text.clone()) };
    json!({
        "type": kind,
        "room_id": room_id,
        "session_id": if numeric { Value::Null } else { json!(room_id) },
        "user_id": user_id,
        "message_id": id,
        "emoji": text,
        "message": {"id": id, "sender_id": user_id, "content": text, "type": "text"},
        "reaction": {"user_id": user_id, "emoji": text},
        "room": {"id": room_id, "name": text},
    })
}

fuzz_target!(|input: Input| {
    let text = match input {
        Input::Raw(text) => text,
        Input::Shaped { kind, room_id, message_id, user_id, text, numeric } => {
            let kind = KINDS[kind as usize % KINDS.len()];
            shaped(kind, room_id, message_id, user_id, text, numeric).to_string()
        },
    };

    let Ok(frame) = InboundFrame::parse(&text) else {
        return;
    };

    let InboundFrame::Event(event) = frame else {
        return;
    };
    assert_ne!(event.kind(), kind::AUTH_SUCCESS);
    assert_ne!(event.kind(), kind::AUTH_ERROR);

    let mut store = RoomCacheStore::new(SimEnv::new(), RoomStoreConfig::default()).unwrap();
    for room in 0..4 {
        store.set_cached_room(room, RoomPatch::default());
    }
    let mut router = EventRouter::new(1);
    let _ = router.route(&event, &mut store);
});
