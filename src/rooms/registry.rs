//! Live connection bookkeeping: which connection is joined to which room, and
//! which connections belong to an identity. Purely in memory; clients rejoin
//! after a restart.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Identity;

use super::events::ServerEvent;

pub type ConnectionId = Uuid;
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Handle for one registered live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
}

struct Member {
    identity: Identity,
    outbox: Outbox,
    rooms: HashSet<i64>,
}

// Lock order: `members` before `rooms`/`identities`. Never hold a `rooms`
// or `identities` guard while touching `members`.
#[derive(Default)]
pub struct Registry {
    members: DashMap<ConnectionId, Member>,
    rooms: DashMap<i64, HashSet<ConnectionId>>,
    identities: DashMap<Identity, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and subscribes it to its identity channel.
    pub fn connect(&self, identity: Identity, outbox: Outbox) -> Connection {
        let id = Uuid::now_v7();
        self.members.insert(id, Member { identity, outbox, rooms: HashSet::new() });
        self.identities.entry(identity).or_default().insert(id);
        Connection { id, identity }
    }

    /// Returns false if the connection was already joined (or is gone).
    pub fn join(&self, conn: ConnectionId, room_id: i64) -> bool {
        let Some(mut member) = self.members.get_mut(&conn) else {
            return false;
        };
        if !member.rooms.insert(room_id) {
            return false;
        }
        self.rooms.entry(room_id).or_default().insert(conn);
        true
    }

    pub fn leave(&self, conn: ConnectionId, room_id: i64) -> bool {
        let Some(mut member) = self.members.get_mut(&conn) else {
            return false;
        };
        if !member.rooms.remove(&room_id) {
            return false;
        }
        drop(member);
        self.unlink(&self.rooms, &room_id, conn);
        true
    }

    /// Drops every room and identity subscription of the connection.
    pub fn disconnect(&self, conn: ConnectionId) {
        let Some((_, member)) = self.members.remove(&conn) else {
            return;
        };
        for room_id in &member.rooms {
            self.unlink(&self.rooms, room_id, conn);
        }
        self.unlink(&self.identities, &member.identity, conn);
    }

    pub fn is_joined(&self, conn: ConnectionId, room_id: i64) -> bool {
        self.members
            .get(&conn)
            .is_some_and(|member| member.rooms.contains(&room_id))
    }

    /// Queues `event` for every connection joined to the room, except `skip`.
    /// Returns how many connections it was queued for.
    pub fn broadcast(
        &self,
        room_id: i64,
        event: &ServerEvent,
        skip: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<ConnectionId> = match self.rooms.get(&room_id) {
            Some(conns) => conns.iter().copied().filter(|conn| Some(*conn) != skip).collect(),
            None => return 0,
        };
        self.deliver(&targets, event)
    }

    /// Queues `event` on every connection of `identity`, joined to the room or not.
    pub fn notify(&self, identity: Identity, event: &ServerEvent) -> usize {
        let targets: Vec<ConnectionId> = match self.identities.get(&identity) {
            Some(conns) => conns.iter().copied().collect(),
            None => return 0,
        };
        self.deliver(&targets, event)
    }

    /// Sends to a single connection.
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.members
            .get(&conn)
            .is_some_and(|member| member.outbox.send(event).is_ok())
    }

    pub fn room_size(&self, room_id: i64) -> usize {
        self.rooms.get(&room_id).map_or(0, |conns| conns.len())
    }

    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    fn deliver(&self, targets: &[ConnectionId], event: &ServerEvent) -> usize {
        targets
            .iter()
            .filter(|conn| {
                self.members
                    .get(*conn)
                    .is_some_and(|member| member.outbox.send(event.clone()).is_ok())
            })
            .count()
    }

    fn unlink<K>(&self, map: &DashMap<K, HashSet<ConnectionId>>, key: &K, conn: ConnectionId)
    where
        K: Eq + std::hash::Hash,
    {
        if let Some(mut conns) = map.get_mut(key) {
            conns.remove(&conn);
        }
        map.remove_if(key, |_, conns| conns.is_empty());
    }
}
