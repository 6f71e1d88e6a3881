//! Fuzz target for room store operation sequences
//!
//! # Strategy
//!
//! - Random operation sequences over a small room and message ID space so
//!   collisions (duplicate delivery, echo/response races, re-IDs) are common
//! - Random capacity and clock advances so eviction ties and staleness occur
//!
//! # Invariants
//!
//! - Standard store invariants hold after every operation
//! - NEVER panic

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_cache::{
    Member, MessageDraft, MessageId, MessagePatch, RoomCacheStore, RoomPatch, RoomStoreConfig,
    RoomSummary,
};
use parley_harness::{InvariantRegistry, SimEnv, StoreSnapshot};

#[derive(Debug, Arbitrary)]
enum Op {
    Cache { room: u8, messages: Vec<u8>, members: Vec<u8> },
    Add { room: u8, id: u8, local: bool },
    Remove { room: u8, id: u8 },
    Reconcile { room: u8, seed: u8, id: u8 },
    Echo { room: u8, seed: u8, id: u8 },
    Rename { room: u8, from: u8, to: u8 },
    Member { room: u8, user: u8 },
    List { rooms: Vec<u8> },
    ListAdd { room: u8 },
    Drop { room: u8 },
    Invalidate { room: u8 },
    Tick { millis: u8 },
}

fn draft(n: u8) -> MessageDraft {
    MessageDraft::text(format!("m{}", n % 4))
}

fn summary(id: u8) -> RoomSummary {
    RoomSummary { id: u64::from(id % 8), name: String::new(), unread_count: 0, last_message: None }
}

fuzz_target!(|input: (u8, Vec<Op>)| {
    let (capacity, ops) = input;
    let env = SimEnv::new();
    let config = RoomStoreConfig {
        max_cached_rooms: usize::from(capacity % 6) + 1,
        ..RoomStoreConfig::default()
    };
    let mut store = RoomCacheStore::new(env.clone(), config).unwrap();
    let registry = InvariantRegistry::standard();

    for op in ops {
        match op {
            Op::Cache { room, messages, members } => {
                let messages = messages
                    .into_iter()
                    .map(|id| draft(id).into_local_message(MessageId::Server(u64::from(id % 8)), 2))
                    .collect();
                let members = members
                    .into_iter()
                    .map(|user| Member { user_id: u64::from(user % 4), username: String::new(), role: None })
                    .collect();
                store.set_cached_room(
                    u64::from(room % 8),
                    RoomPatch::default().with_messages(messages).with_members(members),
                );
            },
            Op::Add { room, id, local } => {
                let message_id = if local {
                    MessageId::local(u64::from(id % 4))
                } else {
                    MessageId::Server(u64::from(id % 8))
                };
                store.add_message(u64::from(room % 8), draft(id).into_local_message(message_id, 1));
            },
            Op::Remove { room, id } => {
                store.remove_message(u64::from(room % 8), &MessageId::Server(u64::from(id % 8)));
            },
            Op::Reconcile { room, seed, id } => {
                let persisted = draft(seed).into_local_message(MessageId::Server(u64::from(id % 8)), 1);
                store.reconcile_message(u64::from(room % 8), &MessageId::local(u64::from(seed % 4)), persisted);
            },
            Op::Echo { room, seed, id } => {
                let echo = draft(seed).into_local_message(MessageId::Server(u64::from(id % 8)), 1);
                if !store.absorb_echo(u64::from(room % 8), echo.clone()) {
                    store.add_message(u64::from(room % 8), echo);
                }
            },
            Op::Rename { room, from, to } => {
                let patch = MessagePatch {
                    id: Some(MessageId::Server(u64::from(to % 8))),
                    ..MessagePatch::default()
                };
                store.update_message(u64::from(room % 8), &MessageId::Server(u64::from(from % 8)), patch);
            },
            Op::Member { room, user } => {
                store.add_member(
                    u64::from(room % 8),
                    Member { user_id: u64::from(user % 4), username: String::new(), role: None },
                );
            },
            Op::List { rooms } => store.set_room_list(rooms.into_iter().map(summary).collect()),
            Op::ListAdd { room } => {
                store.add_room_to_list(summary(room));
            },
            Op::Drop { room } => {
                store.remove_room(u64::from(room % 8));
            },
            Op::Invalidate { room } => {
                store.invalidate_room(u64::from(room % 8));
            },
            Op::Tick { millis } => env.advance(Duration::from_millis(u64::from(millis % 4))),
        }

        registry.assert_all(&StoreSnapshot::from_store(&store), "after fuzzed operation");
    }
});
