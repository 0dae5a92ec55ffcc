use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use indexmap::IndexSet;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::events::{ConnectionId, RoomId, RoomInfo, RoomSummary};

use super::msg::{Message, MessageLog};

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    members: IndexSet<ConnectionId>,
    log: MessageLog,
    // set once the room has left the index; a closed room never takes new members
    closed: bool,
}

impl Room {
    fn new(id: RoomId, history_limit: Option<NonZeroUsize>) -> Self {
        Self { id, members: IndexSet::new(), log: MessageLog::new(history_limit), closed: false }
    }

    pub fn members(&self) -> &IndexSet<ConnectionId> {
        &self.members
    }

    pub fn append(&mut self, message: Message) {
        self.log.append(message);
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.log.history()
    }

    pub fn message_count(&self) -> usize {
        self.log.count()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            user_count: self.members.len(),
            users: self.members.iter().cloned().collect(),
            message_count: self.log.count(),
        }
    }
}

/// Room index. Each room sits behind its own lock; the index lock is only held
/// for lookups and inserts, never while waiting on a room.
#[derive(Debug, Default)]
pub struct Directory {
    rooms: Mutex<HashMap<RoomId, Arc<Mutex<Room>>>>,
    history_limit: Option<NonZeroUsize>,
}

impl Directory {
    pub fn new(history_limit: Option<NonZeroUsize>) -> Self {
        Self { rooms: Mutex::new(HashMap::new()), history_limit }
    }

    pub async fn ensure_room(&self, room_id: &str) -> Arc<Mutex<Room>> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            return Arc::clone(room);
        }

        tracing::debug!(room_id, "creating room");
        let room = Arc::new(Mutex::new(Room::new(room_id.to_owned(), self.history_limit)));
        rooms.insert(room_id.to_owned(), Arc::clone(&room));
        room
    }

    /// Locks the room, if it exists.
    pub async fn room(&self, room_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let room = self.rooms.lock().await.get(room_id).cloned()?;
        let guard = room.lock_owned().await;
        (!guard.closed).then_some(guard)
    }

    /// Adds the member and hands back the still-locked room so the caller can
    /// broadcast before anyone else touches it.
    pub async fn add_member(&self, room_id: &str, connection_id: &str) -> OwnedMutexGuard<Room> {
        loop {
            let mut guard = self.ensure_room(room_id).await.lock_owned().await;
            if guard.closed {
                // lost a race with the last member leaving; the next ensure_room makes a fresh one
                continue;
            }
            guard.members.insert(connection_id.to_owned());
            return guard;
        }
    }

    /// Removes the member. When the room empties it is dropped from the index
    /// together with its log before the lock is released. Returns the locked
    /// room (possibly empty) or `None` if there was no such room.
    pub async fn remove_member(&self, room_id: &str, connection_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let mut guard = self.room(room_id).await?;
        guard.members.shift_remove(connection_id);

        if guard.members.is_empty() {
            guard.closed = true;
            self.rooms.lock().await.remove(room_id);
            tracing::info!(room_id, "room deleted (empty)");
        }

        Some(guard)
    }

    pub async fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        match self.room(room_id).await {
            Some(room) => room.members.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        match self.room(room_id).await {
            Some(room) => room.members.len(),
            None => 0,
        }
    }

    pub async fn room_info(&self, room_id: &str) -> RoomInfo {
        match self.room(room_id).await {
            Some(room) => room.info(),
            None => RoomInfo::default(),
        }
    }

    pub async fn active_rooms(&self) -> Vec<RoomSummary> {
        let rooms: Vec<_> = self.rooms.lock().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let room = room.lock().await;
            if room.closed {
                continue;
            }
            summaries.push(RoomSummary {
                room_id: room.id.clone(),
                user_count: room.members.len(),
                message_count: room.message_count(),
            });
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn msg(data: &str) -> Message {
        Message {
            sender: "Alice".into(),
            data: data.into(),
            socket_id: "a".into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn members_keep_insertion_order_and_are_idempotent() {
        let directory = Directory::new(None);
        drop(directory.add_member("r", "b").await);
        drop(directory.add_member("r", "a").await);
        drop(directory.add_member("r", "b").await);

        assert_eq!(directory.members("r").await, ["b", "a"]);
        assert_eq!(directory.member_count("r").await, 2);
    }

    #[tokio::test]
    async fn last_member_out_deletes_room_and_log() {
        let directory = Directory::new(None);
        {
            let mut room = directory.add_member("x", "a").await;
            room.append(msg("one"));
            room.append(msg("two"));
        }
        assert_eq!(directory.room_info("x").await.message_count, 2);

        let room = directory.remove_member("x", "a").await.unwrap();
        assert!(room.members().is_empty());
        drop(room);

        assert_eq!(directory.room_info("x").await, RoomInfo::default());
        assert!(directory.active_rooms().await.is_empty());

        // a fresh room under the same id starts with no history
        drop(directory.add_member("x", "b").await);
        assert_eq!(directory.room_info("x").await.message_count, 0);
    }

    #[tokio::test]
    async fn unknown_room_is_zero_valued() {
        let directory = Directory::new(None);
        assert!(directory.remove_member("nope", "a").await.is_none());
        assert_eq!(directory.member_count("nope").await, 0);
        assert!(directory.members("nope").await.is_empty());
        assert_eq!(directory.room_info("nope").await, RoomInfo::default());
    }

    #[tokio::test]
    async fn removing_a_stranger_keeps_room() {
        let directory = Directory::new(None);
        drop(directory.add_member("r", "a").await);
        drop(directory.remove_member("r", "b").await);
        assert_eq!(directory.members("r").await, ["a"]);
    }

    #[tokio::test]
    async fn ensure_room_is_idempotent() {
        let directory = Directory::new(None);
        let first = directory.ensure_room("r").await;
        let second = directory.ensure_room("r").await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn active_rooms_are_listed() {
        let directory = Directory::new(NonZeroUsize::new(1));
        {
            let mut room = directory.add_member("b", "a").await;
            room.append(msg("one"));
            room.append(msg("two"));
        }
        drop(directory.add_member("a", "c").await);

        let rooms = directory.active_rooms().await;
        assert_eq!(
            rooms,
            [
                RoomSummary { room_id: "a".into(), user_count: 1, message_count: 0 },
                RoomSummary { room_id: "b".into(), user_count: 1, message_count: 1 },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_never_leaves_empty_rooms() {
        let directory = Arc::new(Directory::new(None));
        let mut tasks = Vec::new();
        for i in 0..32 {
            let directory = Arc::clone(&directory);
            tasks.push(tokio::spawn(async move {
                let id = format!("c{i}");
                for _ in 0..50 {
                    drop(directory.add_member("hot", &id).await);
                    drop(directory.remove_member("hot", &id).await);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(directory.member_count("hot").await, 0);
        assert!(directory.active_rooms().await.is_empty());
    }
}
