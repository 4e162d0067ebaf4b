//! WebSocket layer: live subscriptions to local fan-out topics.
//!
//! Clients connect to `/ws`, subscribe to one or more channel ids and
//! receive every [`FanoutEvent`](crate::domain::FanoutEvent) a
//! `local` fan-out target publishes for those channels.

pub mod connection;
pub mod messages;
pub mod subscription;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use crate::app_state::AppState;

/// Largest client frame accepted; commands are small JSON objects.
const MAX_CLIENT_MESSAGE: usize = 64 * 1024;

/// `GET /ws`: upgrades to a WebSocket session on the local fan-out bus.
///
/// The bus subscription is taken before the upgrade completes, so events
/// published right after the handshake are not lost.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let events = state.local_bus.subscribe();
    let shutdown = state.shutdown.clone();

    ws.max_message_size(MAX_CLIENT_MESSAGE)
        .on_upgrade(move |socket| connection::run_connection(socket, events, shutdown))
}
