//! Standard room store invariants.

use std::{collections::HashSet, hash::Hash};

use super::{Invariant, InvariantResult, StoreSnapshot, Violation};

fn first_duplicate<T: Eq + Hash + Clone>(items: &[T]) -> Option<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().find(|item| !seen.insert(*item)).cloned()
}

/// Never more cached rooms than the configured capacity.
pub struct CapacityBound;

impl Invariant for CapacityBound {
    fn name(&self) -> &'static str {
        "capacity_bound"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        if state.rooms.len() > state.max_cached_rooms {
            return Err(Violation::store(
                self.name(),
                format!("{} rooms cached, capacity {}", state.rooms.len(), state.max_cached_rooms),
            ));
        }
        Ok(())
    }
}

/// A message ID appears at most once per room.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for room in &state.rooms {
            if let Some(id) = first_duplicate(&room.message_ids) {
                return Err(Violation::in_room(
                    self.name(),
                    room.id,
                    format!("message {id} appears twice"),
                ));
            }
        }
        Ok(())
    }
}

/// A user appears at most once in a room's member set.
pub struct UniqueMembers;

impl Invariant for UniqueMembers {
    fn name(&self) -> &'static str {
        "unique_members"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for room in &state.rooms {
            if let Some(user) = first_duplicate(&room.member_ids) {
                return Err(Violation::in_room(
                    self.name(),
                    room.id,
                    format!("member {user} appears twice"),
                ));
            }
        }
        Ok(())
    }
}

/// A room is listed at most once.
pub struct UniqueListing;

impl Invariant for UniqueListing {
    fn name(&self) -> &'static str {
        "unique_listing"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        if let Some(id) = first_duplicate(&state.listed) {
            return Err(Violation::store(self.name(), format!("room {id} listed twice")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_cache::MessageId;

    use super::*;
    use crate::invariants::RoomSnapshot;

    #[test]
    fn duplicate_message_is_reported() {
        let mut state = StoreSnapshot::empty(5);
        state.rooms.push(RoomSnapshot {
            id: 1,
            message_ids: vec![MessageId::Server(1), MessageId::Server(1)],
            member_ids: Vec::new(),
        });

        let violation = UniqueMessageIds.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "unique_message_ids");
    }

    #[test]
    fn over_capacity_is_reported() {
        let mut state = StoreSnapshot::empty(1);
        for id in 0..2 {
            state.rooms.push(RoomSnapshot { id, message_ids: Vec::new(), member_ids: Vec::new() });
        }
        assert!(CapacityBound.check(&state).is_err());
    }
}
