//! WebSocket handler for real-time snapshot streaming

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::ResourceKind;
use crate::api::state::ApiState;

/// WebSocket upgrade handler
///
/// GET /api/v1/stream/:resource
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(resource): Path<String>,
) -> Response {
    match state.monitored(&resource) {
        Ok(kind) => ws.on_upgrade(move |socket| handle_websocket(socket, state, kind)),
        Err(e) => e.into_response(),
    }
}

/// Bridge one hub subscription to one socket until either side ends
async fn handle_websocket(socket: WebSocket, state: ApiState, kind: ResourceKind) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = state.hub.subscribe(kind);
    let id = subscription.id;
    info!(%kind, id, "WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = subscription.recv().await {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.hub.unsubscribe(id);
    info!(%kind, id, "WebSocket client disconnected");
}
