use std::collections::HashMap;

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::events::ConnectionId;

/// Join timestamps, kept only to report how long a connection stayed online.
#[derive(Debug, Default)]
pub struct Presence {
    online_since: Mutex<HashMap<ConnectionId, OffsetDateTime>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_online(&self, connection_id: &str, now: OffsetDateTime) {
        self.online_since.lock().await.insert(connection_id.to_owned(), now);
    }

    pub async fn take_duration(&self, connection_id: &str, now: OffsetDateTime) -> Option<Duration> {
        let since = self.online_since.lock().await.remove(connection_id)?;
        Some((now - since).abs())
    }
}

/// Formats as `"{minutes}m {seconds}s"`.
pub fn format_duration(duration: Duration) -> String {
    format!("{}m {}s", duration.whole_minutes(), duration.whole_seconds() % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duration_is_taken_once() {
        let presence = Presence::new();
        let joined = OffsetDateTime::now_utc();
        presence.mark_online("a", joined).await;

        let left = joined + Duration::seconds(125);
        assert_eq!(presence.take_duration("a", left).await, Some(Duration::seconds(125)));
        assert_eq!(presence.take_duration("a", left).await, None);
    }

    #[tokio::test]
    async fn mark_online_overwrites() {
        let presence = Presence::new();
        let first = OffsetDateTime::now_utc();
        presence.mark_online("a", first).await;
        presence.mark_online("a", first + Duration::seconds(30)).await;

        let d = presence.take_duration("a", first + Duration::seconds(40)).await;
        assert_eq!(d, Some(Duration::seconds(10)));
    }

    #[tokio::test]
    async fn never_joined_has_no_duration() {
        let presence = Presence::new();
        assert_eq!(presence.take_duration("ghost", OffsetDateTime::now_utc()).await, None);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(Duration::milliseconds(900)), "0m 0s");
    }
}
