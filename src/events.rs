//! Wire events. Every frame is a JSON object `{"event": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

pub type ConnectionId = String;
pub type RoomId = String;

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinCall { room_id: RoomId },
    /// Opaque WebRTC negotiation payload for one peer.
    #[serde(rename_all = "camelCase")]
    Signal { to_id: ConnectionId, message: Value },
    ChatMessage { data: String, sender: String },
    #[serde(rename_all = "camelCase")]
    LeaveCall { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    GetRoomInfo { room_id: RoomId },
}

impl ClientEvent {
    pub fn from_frame(frame: &str) -> Result<ClientEvent> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinCall { .. } => "join-call",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::ChatMessage { .. } => "chat-message",
            ClientEvent::LeaveCall { .. } => "leave-call",
            ClientEvent::GetRoomInfo { .. } => "get-room-info",
        }
    }
}

/// Events the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserJoined { socket_id: ConnectionId, clients: Vec<ConnectionId> },
    #[serde(rename_all = "camelCase")]
    ChatMessage { data: String, sender: String, socket_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    Signal { from_id: ConnectionId, message: Value },
    #[serde(rename_all = "camelCase")]
    UserLeft { socket_id: ConnectionId },
    RoomInfo(RoomInfo),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub user_count: usize,
    pub users: Vec<ConnectionId>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub user_count: usize,
    pub message_count: usize,
}
