//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! applying subscription commands and forwarding matching fan-out events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{ChannelId, FanoutEvent};
use crate::fanout::TopicReceiver;

/// Runs the read/write loop for a single WebSocket connection until the
/// client leaves, the bus closes or `shutdown` fires.
pub async fn run_connection(
    socket: WebSocket,
    mut events: TopicReceiver,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs);
                        if let Some(json) = encode(&reply)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if !subs.matches(&event.topic) {
                    continue;
                }
                if let Some(json) = forward(&event)
                    && ws_tx.send(Message::text(json)).await.is_err()
                {
                    break;
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn encode(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg).ok()
}

/// Wraps a fan-out event in an `event` frame.
fn forward(event: &FanoutEvent) -> Option<String> {
    let payload = serde_json::to_value(event).ok()?;
    encode(&WsMessage::new(
        uuid::Uuid::new_v4().to_string(),
        WsMessageType::Event,
        payload,
    ))
}

/// Splits raw ids into parsed channel ids and the wildcard flag. Ids that
/// are not UUIDs are ignored.
fn parse_ids(raw: &[String]) -> (Vec<ChannelId>, bool) {
    let wildcard = raw.iter().any(|id| id == "*");
    let ids = raw.iter().filter_map(|id| id.parse().ok()).collect();
    (ids, wildcard)
}

/// Applies one client message and builds the reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command message");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    let payload = match command {
        WsCommand::Subscribe { channel_ids } => {
            let (ids, wildcard) = parse_ids(&channel_ids);
            subs.subscribe(&ids, wildcard);
            serde_json::json!({
                "subscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { channel_ids } => {
            let (ids, wildcard) = parse_ids(&channel_ids);
            subs.unsubscribe(&ids, wildcard);
            serde_json::json!({
                "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
    };
    WsMessage::new(msg.id, WsMessageType::Response, payload)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn command(payload: serde_json::Value) -> String {
        serde_json::json!({
            "id": "1",
            "type": "command",
            "timestamp": "2024-01-01T00:00:00Z",
            "payload": payload,
        })
        .to_string()
    }

    #[test]
    fn subscribe_then_unsubscribe() {
        let mut subs = SubscriptionManager::new();
        let id = ChannelId::generate();
        let reply = handle_text_message(
            &command(serde_json::json!({
                "command": "subscribe",
                "channel_ids": [id.to_string(), "not-a-uuid"],
            })),
            &mut subs,
        );
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.payload["count"], 1);
        assert!(subs.matches(&id.topic()));

        let reply = handle_text_message(
            &command(serde_json::json!({
                "command": "unsubscribe",
                "channel_ids": [id.to_string()],
            })),
            &mut subs,
        );
        assert_eq!(reply.payload["remaining_count"], 0);
        assert!(!subs.matches(&id.topic()));
    }

    #[test]
    fn malformed_and_unknown_messages_are_errors() {
        let mut subs = SubscriptionManager::new();
        assert_eq!(
            handle_text_message("{", &mut subs).msg_type,
            WsMessageType::Error
        );
        let reply = handle_text_message(
            &command(serde_json::json!({ "command": "swap" })),
            &mut subs,
        );
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 404);
    }

    #[test]
    fn forwarded_frame_carries_the_event() {
        let id = ChannelId::generate();
        let event = FanoutEvent::new(id.topic(), "WEBHOOK_MATTR_EVENT", serde_json::json!({ "n": 1 }));
        let Some(json) = forward(&event) else {
            panic!("event should encode");
        };
        let Ok(frame) = serde_json::from_str::<WsMessage>(&json) else {
            panic!("frame should decode");
        };
        assert_eq!(frame.msg_type, WsMessageType::Event);
        assert_eq!(frame.payload["topic"], id.topic().as_str());
        assert_eq!(frame.payload["data"]["n"], 1);
    }
}
