use time::OffsetDateTime;

use crate::{
    config::Config,
    events::{ClientEvent, ConnectionId, RoomId, RoomSummary, ServerEvent},
    presence::{self, Presence},
    registry::{Outbox, Registry},
    rooms::{Directory, Message},
};

/// The signaling state machine. One instance owns every store it touches;
/// nothing here is process-global.
#[derive(Debug)]
pub struct Relay {
    registry: Registry,
    directory: Directory,
    presence: Presence,
}

impl Default for Relay {
    fn default() -> Self {
        Relay::new(&Config::default())
    }
}

impl Relay {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: Registry::new(),
            directory: Directory::new(config.history_limit),
            presence: Presence::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn connect(&self, connection_id: &str, outbox: Outbox) {
        tracing::info!(connection_id, "new connection established");
        self.registry.register(connection_id, outbox).await;
    }

    pub async fn dispatch(&self, connection_id: &str, event: ClientEvent) {
        tracing::trace!(connection_id, event = event.name(), "dispatching");
        match event {
            ClientEvent::JoinCall { room_id } => self.join_call(connection_id, room_id).await,
            ClientEvent::Signal { to_id, message } => self.signal(connection_id, &to_id, message).await,
            ClientEvent::ChatMessage { data, sender } => self.chat_message(connection_id, data, sender).await,
            ClientEvent::LeaveCall { room_id } => self.leave_call(connection_id, &room_id).await,
            ClientEvent::GetRoomInfo { room_id } => self.get_room_info(connection_id, &room_id).await,
        }
    }

    async fn join_call(&self, connection_id: &str, room_id: RoomId) {
        tracing::info!(connection_id, room_id = %room_id, "joining room");
        let now = OffsetDateTime::now_utc();

        let previous = self.registry.assign_room(connection_id, &room_id, now).await;
        if let Some(previous) = previous.filter(|p| *p != room_id) {
            tracing::debug!(connection_id, room_id = %previous, "leaving previous room before rebinding");
            self.depart(connection_id, &previous).await;
        }

        let room = self.directory.add_member(&room_id, connection_id).await;
        self.presence.mark_online(connection_id, now).await;

        let joined = ServerEvent::UserJoined {
            socket_id: connection_id.to_owned(),
            clients: room.members().iter().cloned().collect(),
        };
        self.registry.deliver_all(room.members(), &joined).await;

        for message in room.history() {
            self.registry.deliver(connection_id, message.to_event()).await;
        }

        tracing::info!(room_id = %room_id, users = room.members().len(), "room membership changed");
    }

    async fn signal(&self, connection_id: &str, to_id: &str, message: serde_json::Value) {
        let event = ServerEvent::Signal { from_id: connection_id.to_owned(), message };
        if !self.registry.deliver(to_id, event).await {
            tracing::debug!(connection_id, to_id, "signal target not connected or backed up, dropped");
        }
    }

    async fn chat_message(&self, connection_id: &str, data: String, sender: String) {
        let Some(room_id) = self.registry.room_of(connection_id).await else {
            tracing::warn!(connection_id, "chat message from connection not in any room");
            return;
        };
        let Some(mut room) = self.directory.room(&room_id).await else {
            tracing::warn!(connection_id, room_id = %room_id, "chat message for a room that no longer exists");
            return;
        };

        tracing::info!(room_id = %room_id, sender = %sender, "chat message");
        let message = Message {
            sender,
            data,
            socket_id: connection_id.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
        };
        let event = message.to_event();
        room.append(message);
        self.registry.deliver_all(room.members(), &event).await;
    }

    async fn leave_call(&self, connection_id: &str, room_id: &str) {
        tracing::info!(connection_id, room_id, "leaving room");
        if self.registry.room_of(connection_id).await.as_deref() == Some(room_id) {
            self.registry.unassign(connection_id).await;
        }
        self.depart(connection_id, room_id).await;
    }

    async fn get_room_info(&self, connection_id: &str, room_id: &str) {
        let info = self.directory.room_info(room_id).await;
        self.registry.deliver(connection_id, ServerEvent::RoomInfo(info)).await;
    }

    pub async fn disconnect(&self, connection_id: &str) {
        tracing::info!(connection_id, "connection closed");

        let now = OffsetDateTime::now_utc();
        if let Some(online) = self.presence.take_duration(connection_id, now).await {
            tracing::info!(connection_id, online = %presence::format_duration(online), "time online");
        }

        let room_id = self.registry.remove(connection_id).await.and_then(|c| c.room_id);
        if let Some(room_id) = room_id {
            self.depart(connection_id, &room_id).await;
        }
    }

    /// Drops the member from the room and tells whoever is left.
    async fn depart(&self, connection_id: &str, room_id: &str) {
        let Some(room) = self.directory.remove_member(room_id, connection_id).await else {
            return;
        };

        let left = ServerEvent::UserLeft { socket_id: connection_id.to_owned() };
        self.registry.deliver_all(room.members(), &left).await;
        tracing::info!(room_id, users = room.members().len(), "room membership changed");
    }

    pub async fn active_rooms(&self) -> Vec<RoomSummary> {
        self.directory.active_rooms().await
    }

    pub async fn room_of(&self, connection_id: &str) -> Option<RoomId> {
        self.registry.room_of(connection_id).await
    }

    pub async fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.directory.members(room_id).await
    }
}
