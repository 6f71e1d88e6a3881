//! Property-based tests for the room cache store.
//!
//! Arbitrary operation sequences must never exceed capacity or duplicate a
//! message, member, or listing entry.

use std::time::Duration;

use parley_cache::{
    Member, MessageDraft, MessageId, MessagePatch, RoomCacheStore, RoomMetadata, RoomPatch,
    RoomStoreConfig, RoomSummary,
};
use parley_harness::{InvariantRegistry, SimEnv, StoreSnapshot};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Cache { room: u64 },
    AddMessage { room: u64, id: u64 },
    AddLocal { room: u64, seed: u64 },
    Reconcile { room: u64, seed: u64, id: u64 },
    Echo { room: u64, seed: u64, id: u64 },
    Rename { room: u64, from: u64, to: u64 },
    AddMember { room: u64, user: u64 },
    List { room: u64 },
    Remove { room: u64 },
    Tick { millis: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let room = 0u64..8;
    let id = 0u64..6;
    let seed = 0u64..3;
    prop_oneof![
        3 => room.clone().prop_map(|room| Op::Cache { room }),
        4 => (room.clone(), id.clone()).prop_map(|(room, id)| Op::AddMessage { room, id }),
        2 => (room.clone(), seed.clone()).prop_map(|(room, seed)| Op::AddLocal { room, seed }),
        2 => (room.clone(), seed.clone(), id.clone())
            .prop_map(|(room, seed, id)| Op::Reconcile { room, seed, id }),
        2 => (room.clone(), seed, id.clone()).prop_map(|(room, seed, id)| Op::Echo { room, seed, id }),
        1 => (room.clone(), id.clone(), id).prop_map(|(room, from, to)| Op::Rename { room, from, to }),
        2 => (room.clone(), 0u64..4).prop_map(|(room, user)| Op::AddMember { room, user }),
        1 => room.clone().prop_map(|room| Op::List { room }),
        1 => room.prop_map(|room| Op::Remove { room }),
        2 => (0u64..5).prop_map(|millis| Op::Tick { millis }),
    ]
}

fn metadata(id: u64) -> RoomMetadata {
    RoomMetadata { id, name: String::new(), description: None, is_private: false, created_by: None }
}

fn content(seed: u64) -> String {
    format!("draft {seed}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_store_invariants_hold(
        capacity in 1usize..4,
        ops in prop::collection::vec(op_strategy(), 0..100),
    ) {
        let env = SimEnv::new();
        let config = RoomStoreConfig { max_cached_rooms: capacity, ..RoomStoreConfig::default() };
        let mut store = RoomCacheStore::new(env.clone(), config).unwrap();
        let registry = InvariantRegistry::standard();

        for op in ops {
            match op {
                Op::Cache { room } => {
                    store.set_cached_room(room, RoomPatch::default().with_room(metadata(room)));
                },
                Op::AddMessage { room, id } => {
                    let message = MessageDraft::text(content(id))
                        .into_local_message(MessageId::Server(id), 2);
                    store.add_message(room, message);
                },
                Op::AddLocal { room, seed } => {
                    let message = MessageDraft::text(content(seed))
                        .into_local_message(MessageId::local(seed), 1);
                    store.add_message(room, message);
                },
                Op::Reconcile { room, seed, id } => {
                    let persisted = MessageDraft::text(content(seed))
                        .into_local_message(MessageId::Server(id), 1);
                    store.reconcile_message(room, &MessageId::local(seed), persisted);
                },
                Op::Echo { room, seed, id } => {
                    let echo = MessageDraft::text(content(seed))
                        .into_local_message(MessageId::Server(id), 1);
                    if !store.absorb_echo(room, echo.clone()) {
                        store.add_message(room, echo);
                    }
                },
                Op::Rename { room, from, to } => {
                    let patch = MessagePatch { id: Some(MessageId::Server(to)), ..MessagePatch::default() };
                    store.update_message(room, &MessageId::Server(from), patch);
                },
                Op::AddMember { room, user } => {
                    store.add_member(room, Member { user_id: user, username: String::new(), role: None });
                },
                Op::List { room } => {
                    store.add_room_to_list(RoomSummary { id: room, name: String::new(), unread_count: 0, last_message: None });
                },
                Op::Remove { room } => {
                    store.remove_room(room);
                },
                Op::Tick { millis } => env.advance(Duration::from_millis(millis)),
            }

            let snapshot = StoreSnapshot::from_store(&store);
            if let Err(violations) = registry.check_all(&snapshot) {
                prop_assert!(false, "{:?}", violations);
            }
        }
    }

    /// The room evicted is always one with the oldest fetch time.
    #[test]
    fn prop_eviction_picks_oldest(gaps in prop::collection::vec(0u64..3, 3..10)) {
        let env = SimEnv::new();
        let config = RoomStoreConfig { max_cached_rooms: 2, ..RoomStoreConfig::default() };
        let mut store = RoomCacheStore::new(env.clone(), config).unwrap();

        for (room, gap) in gaps.iter().enumerate() {
            env.advance(Duration::from_millis(*gap));
            let before = store.cached_room_ids();
            store.set_cached_room(room as u64, RoomPatch::default());

            if before.len() == 2 {
                let evicted: Vec<u64> = before
                    .iter()
                    .copied()
                    .filter(|id| !store.is_cached(*id))
                    .collect();
                prop_assert_eq!(evicted.len(), 1);
                // Inserted in ID order, so the lower ID is never fetched later
                prop_assert_eq!(evicted[0], *before.iter().min().unwrap());
            }
        }
    }
}
