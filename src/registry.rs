use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex, Notify,
};

use crate::events::{ConnectionId, RoomId, ServerEvent};

/// Bounded queue of events waiting to be written to one connection.
#[derive(Debug, Clone)]
pub struct Outbox {
    events: mpsc::Sender<ServerEvent>,
    overflow: Arc<Notify>,
}

/// Receiving end of an [`Outbox`]. `overflow` fires when the queue was full
/// and an event had to be dropped; the session owning it should end.
#[derive(Debug)]
pub struct Inbox {
    pub events: mpsc::Receiver<ServerEvent>,
    pub overflow: Arc<Notify>,
}

impl Outbox {
    pub fn channel(capacity: NonZeroUsize) -> (Outbox, Inbox) {
        let (tx, rx) = mpsc::channel(capacity.get());
        let overflow = Arc::new(Notify::new());
        (
            Outbox { events: tx, overflow: Arc::clone(&overflow) },
            Inbox { events: rx, overflow },
        )
    }

    pub fn push(&self, event: ServerEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Connection {
    pub room_id: Option<RoomId>,
    pub joined_at: Option<OffsetDateTime>,
    outbox: Option<Outbox>,
}

/// Live connections, the room each one is bound to, and where to send its events.
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection_id: &str, outbox: Outbox) {
        let mut connections = self.connections.lock().await;
        let connection = connections.entry(connection_id.to_owned()).or_default();
        if connection.outbox.is_none() {
            connection.outbox = Some(outbox);
        }
    }

    /// Binds the connection to `room_id` and returns the room it was bound to before.
    pub async fn assign_room(&self, connection_id: &str, room_id: &str, now: OffsetDateTime) -> Option<RoomId> {
        let mut connections = self.connections.lock().await;
        let connection = connections.entry(connection_id.to_owned()).or_default();
        connection.joined_at = Some(now);
        connection.room_id.replace(room_id.to_owned())
    }

    pub async fn room_of(&self, connection_id: &str) -> Option<RoomId> {
        self.connections
            .lock()
            .await
            .get(connection_id)
            .and_then(|c| c.room_id.clone())
    }

    pub async fn unassign(&self, connection_id: &str) -> Option<RoomId> {
        let mut connections = self.connections.lock().await;
        let connection = connections.get_mut(connection_id)?;
        connection.joined_at = None;
        connection.room_id.take()
    }

    pub async fn remove(&self, connection_id: &str) -> Option<Connection> {
        self.connections.lock().await.remove(connection_id)
    }

    /// Queues `event` for one connection. Returns false if it isn't live.
    pub async fn deliver(&self, connection_id: &str, event: ServerEvent) -> bool {
        let connections = self.connections.lock().await;
        match connections.get(connection_id).and_then(|c| c.outbox.as_ref()) {
            Some(outbox) => outbox.push(event),
            None => false,
        }
    }

    pub async fn deliver_all<'a>(
        &self,
        connection_ids: impl IntoIterator<Item = &'a ConnectionId>,
        event: &ServerEvent,
    ) {
        let connections = self.connections.lock().await;
        for id in connection_ids {
            if let Some(outbox) = connections.get(id).and_then(|c| c.outbox.as_ref()) {
                if !outbox.push(event.clone()) {
                    tracing::debug!(connection_id = %id, "outbox full or closed, dropping event");
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn outbox() -> (Outbox, Inbox) {
        Outbox::channel(NonZeroUsize::new(8).unwrap())
    }

    #[tokio::test]
    async fn assign_overwrites_and_returns_previous() {
        let registry = Registry::new();
        let (tx, _rx) = outbox();
        registry.register("a", tx).await;
        assert_eq!(registry.room_of("a").await, None);

        let now = OffsetDateTime::now_utc();
        assert_eq!(registry.assign_room("a", "r1", now).await, None);
        assert_eq!(registry.assign_room("a", "r2", now).await, Some("r1".to_owned()));
        assert_eq!(registry.room_of("a").await, Some("r2".to_owned()));

        assert_eq!(registry.unassign("a").await, Some("r2".to_owned()));
        assert_eq!(registry.unassign("a").await, None);
    }

    #[tokio::test]
    async fn unknown_ids_degrade_to_none() {
        let registry = Registry::new();
        assert_eq!(registry.room_of("ghost").await, None);
        assert_eq!(registry.unassign("ghost").await, None);
        assert!(registry.remove("ghost").await.is_none());
        assert!(!registry.deliver("ghost", ServerEvent::UserLeft { socket_id: "x".into() }).await);
    }

    #[tokio::test]
    async fn register_twice_keeps_first_outbox() {
        let registry = Registry::new();
        let (first, mut first_rx) = outbox();
        let (second, mut second_rx) = outbox();
        registry.register("a", first).await;
        registry.register("a", second).await;

        assert!(registry.deliver("a", ServerEvent::UserLeft { socket_id: "b".into() }).await);
        assert!(first_rx.events.try_recv().is_ok());
        assert!(second_rx.events.try_recv().is_err());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn full_outbox_drops_and_signals_overflow() {
        let registry = Registry::new();
        let (tx, mut rx) = Outbox::channel(NonZeroUsize::new(1).unwrap());
        registry.register("slow", tx).await;

        let left = ServerEvent::UserLeft { socket_id: "b".into() };
        assert!(registry.deliver("slow", left.clone()).await);
        assert!(!registry.deliver("slow", left.clone()).await);

        tokio::time::timeout(Duration::from_secs(1), rx.overflow.notified())
            .await
            .expect("overflow should be signalled");
        assert_eq!(rx.events.try_recv().ok(), Some(left));
        assert!(rx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_outbox_is_not_overflow() {
        let (tx, rx) = outbox();
        let overflow = Arc::clone(&rx.overflow);
        drop(rx);

        assert!(!tx.push(ServerEvent::UserLeft { socket_id: "b".into() }));
        assert!(tokio::time::timeout(Duration::from_millis(50), overflow.notified()).await.is_err());
    }
}
