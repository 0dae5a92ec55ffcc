use std::{collections::VecDeque, num::NonZeroUsize};

use time::OffsetDateTime;

use crate::events::{ConnectionId, ServerEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Display name chosen by the client, not the connection id.
    pub sender: String,
    pub data: String,
    pub socket_id: ConnectionId,
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::ChatMessage {
            data: self.data.clone(),
            sender: self.sender.clone(),
            socket_id: self.socket_id.clone(),
        }
    }
}

/// Chat history for one room, oldest first.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    limit: Option<NonZeroUsize>,
}

impl MessageLog {
    pub fn new(limit: Option<NonZeroUsize>) -> Self {
        Self { entries: VecDeque::new(), limit }
    }

    pub fn append(&mut self, message: Message) {
        if let Some(limit) = self.limit {
            if self.entries.len() >= limit.get() {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(message);
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}
