use std::sync::Arc;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::{
    config::Config,
    events::ClientEvent,
    registry::{Inbox, Outbox},
    relay::Relay,
};

#[debug_handler(state = crate::AppState)]
pub async fn socket(
    State(relay): State<Arc<Relay>>,
    State(config): State<Arc<Config>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| session(relay, config, stream).await)
}

async fn session(relay: Arc<Relay>, config: Arc<Config>, stream: WebSocket) {
    let connection_id = Uuid::now_v7().to_string();
    let (outbox, Inbox { events: mut rx, overflow }) = Outbox::channel(config.outbox_capacity);
    relay.connect(&connection_id, outbox).await;

    let (mut sender, mut receiver) = stream.split();

    let heartbeat = config.heartbeat_interval;
    let mut outbound_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;

        loop {
            let frame = tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match serde_json::to_string(&event) {
                        Ok(text) => Message::Text(text.into()),
                        Err(err) => {
                            tracing::error!("failed to encode outbound event: {err}");
                            continue;
                        }
                    }
                }
                _ = ticker.tick() => Message::Ping(Bytes::new()),
            };

            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(config.idle_timeout, receiver.next()) => next,
            _ = &mut outbound_task => break,
            _ = overflow.notified() => {
                tracing::warn!(connection_id = %connection_id, "outbound queue full, closing");
                break;
            }
        };

        let msg = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(err))) => {
                tracing::debug!(connection_id = %connection_id, "websocket error: {err}");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(connection_id = %connection_id, "idle timeout, closing");
                break;
            }
        };

        match msg {
            Message::Text(text) => match ClientEvent::from_frame(text.as_str()) {
                Ok(event) => relay.dispatch(&connection_id, event).await,
                Err(err) => tracing::warn!(connection_id = %connection_id, "failed to parse client message: {err}"),
            },
            Message::Close(_) => break,
            // pings, pongs and binary frames only count as liveness
            _ => {}
        }
    }

    outbound_task.abort();
    relay.disconnect(&connection_id).await;
}
