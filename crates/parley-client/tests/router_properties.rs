//! Property-based tests for event routing.
//!
//! Duplicate delivery and echo/confirmation races must leave every message
//! in the cache exactly once.

use std::collections::HashMap;

use parley_cache::{
    MessageDraft, MessageId, RoomCacheStore, RoomPatch, RoomStoreConfig, RoomSummary,
};
use parley_client::EventRouter;
use parley_core::ServerEvent;
use parley_harness::{InvariantRegistry, SimEnv, StoreSnapshot};
use proptest::prelude::*;
use serde_json::{Value, json};

const ME: u64 = 1;
const PEER: u64 = 2;

#[derive(Debug, Clone)]
struct Delivery {
    id: u64,
    string_id: bool,
    from_me: bool,
    content: u8,
}

fn delivery_strategy() -> impl Strategy<Value = Delivery> {
    (0u64..6, any::<bool>(), any::<bool>(), 0u8..3).prop_map(|(id, string_id, from_me, content)| {
        Delivery { id, string_id, from_me, content }
    })
}

fn wire_id(delivery: &Delivery) -> Value {
    if delivery.string_id { json!(format!("m{}", delivery.id)) } else { json!(delivery.id) }
}

fn new_message(room_id: u64, id: Value, sender: u64, content: &str) -> ServerEvent {
    ServerEvent::new(
        "new_message",
        json!({
            "type": "new_message",
            "room_id": room_id,
            "message": {"id": id, "sender_id": sender, "content": content, "type": "text"},
        }),
    )
}

fn setup() -> (EventRouter, RoomCacheStore<SimEnv>) {
    let mut store = RoomCacheStore::new(SimEnv::new(), RoomStoreConfig::default()).unwrap();
    store.set_room_list(vec![RoomSummary {
        id: 1,
        name: "general".into(),
        unread_count: 0,
        last_message: None,
    }]);
    store.set_cached_room(1, RoomPatch::default().with_messages(Vec::new()));
    (EventRouter::new(ME), store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every distinct message is cached once, and only first deliveries from
    /// other users count as unread.
    #[test]
    fn prop_redelivery_never_duplicates(
        deliveries in prop::collection::vec(delivery_strategy(), 0..60),
    ) {
        let (mut router, mut store) = setup();
        let registry = InvariantRegistry::standard();
        let mut first_sender: HashMap<String, u64> = HashMap::new();

        for delivery in &deliveries {
            let id = wire_id(delivery);
            let sender = if delivery.from_me { ME } else { PEER };
            first_sender.entry(id.to_string()).or_insert(sender);

            let content = format!("text {}", delivery.content);
            router.route(&new_message(1, id, sender, &content), &mut store);

            if let Err(violations) = registry.check_all(&StoreSnapshot::from_store(&store)) {
                prop_assert!(false, "{:?}", violations);
            }
        }

        let cached = &store.get_cached_room(1).unwrap().messages;
        prop_assert_eq!(cached.len(), first_sender.len());
        let unread = first_sender.values().filter(|sender| **sender == PEER).count();
        prop_assert_eq!(store.room_summary(1).unwrap().unread_count as usize, unread);
    }

    /// An optimistic send ends as one persisted message whether the echo
    /// arrives before or after the confirmation, and however often it is
    /// redelivered.
    #[test]
    fn prop_echo_and_confirmation_commute(
        echo_first in any::<bool>(),
        echoes in 1usize..4,
        string_id in any::<bool>(),
    ) {
        let (mut router, mut store) = setup();
        let local_id = MessageId::local(7);
        let pending = MessageDraft::text("hi").into_local_message(local_id.clone(), ME);
        store.add_message(1, pending.clone());

        let persisted_id = if string_id { json!("srv-1") } else { json!(100) };
        let mut persisted = pending;
        persisted.id = serde_json::from_value(persisted_id.clone()).unwrap();
        persisted.is_own = true;

        let echo = new_message(1, persisted_id, ME, "hi");
        if echo_first {
            for _ in 0..echoes {
                router.route(&echo, &mut store);
            }
            store.reconcile_message(1, &local_id, persisted.clone());
        } else {
            store.reconcile_message(1, &local_id, persisted.clone());
            for _ in 0..echoes {
                router.route(&echo, &mut store);
            }
        }

        let cached = &store.get_cached_room(1).unwrap().messages;
        prop_assert_eq!(cached.len(), 1);
        prop_assert_eq!(&cached[0].id, &persisted.id);
        prop_assert!(!cached[0].id.is_local());
    }
}
