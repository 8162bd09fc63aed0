//! Connection registry
//!
//! In-memory table of live connections: who they are and which room they
//! are in. Rooms are not stored anywhere else; a room exists exactly as
//! long as some entry names it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::connection::Connection;
use crate::types::ConnectionId;

/// Point-in-time copy of one registry entry
#[derive(Debug, Clone)]
pub struct Entry {
    pub connection: Arc<Connection>,
    pub name: String,
    pub room: String,
}

#[derive(Debug)]
struct Slot {
    /// Registration order, used to keep snapshots stable
    seq: u64,
    connection: Arc<Connection>,
    name: String,
    room: String,
}

#[derive(Debug, Default)]
struct Table {
    slots: HashMap<ConnectionId, Slot>,
    next_seq: u64,
}

/// Shared registry of live connections
///
/// Every operation takes the single table lock for its whole duration and
/// never across an `.await`, so each one is atomic with respect to the
/// others. Lookups hand out clones, never references into the table.
#[derive(Debug, Default)]
pub struct Registry {
    table: Mutex<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Every mutation completes before the guard drops, so a poisoned
        // table is still consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry for `connection`
    ///
    /// Returns false without changing anything if the connection is
    /// already registered (including under the identical name and room).
    pub fn register(&self, connection: &Arc<Connection>, name: &str, room: &str) -> bool {
        let mut table = self.lock();
        if table.slots.contains_key(&connection.id()) {
            return false;
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        table.slots.insert(
            connection.id(),
            Slot {
                seq,
                connection: Arc::clone(connection),
                name: name.to_string(),
                room: room.to_string(),
            },
        );
        debug!("Registered {} as '{}' in '{}'", connection.id(), name, room);
        true
    }

    /// Remove the entry for `id`; false if there was none
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.lock().slots.remove(&id).is_some()
    }

    /// All entries in registration order
    pub fn snapshot(&self) -> Vec<Entry> {
        let table = self.lock();
        let mut slots: Vec<&Slot> = table.slots.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
            .into_iter()
            .map(|slot| Entry {
                connection: Arc::clone(&slot.connection),
                name: slot.name.clone(),
                room: slot.room.clone(),
            })
            .collect()
    }

    /// Connections whose room is `room`
    pub fn members_of(&self, room: &str) -> Vec<Arc<Connection>> {
        self.lock()
            .slots
            .values()
            .filter(|slot| slot.room == room)
            .map(|slot| Arc::clone(&slot.connection))
            .collect()
    }

    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.lock()
            .slots
            .values()
            .map(|slot| Arc::clone(&slot.connection))
            .collect()
    }

    pub fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.lock().slots.get(&id).map(|slot| slot.room.clone())
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.lock().slots.get(&id).map(|slot| slot.name.clone())
    }

    /// Put `id` in `room`; false if `id` is not registered
    pub fn move_room(&self, id: ConnectionId, room: &str) -> bool {
        match self.lock().slots.get_mut(&id) {
            Some(slot) => {
                slot.room = room.to_string();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
