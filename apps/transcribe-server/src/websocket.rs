use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, error, info};
use transcription_queue::RoomReceiver;

use crate::AppState;

/// Joins the session room before upgrading so no event sent during the handshake is lost.
pub async fn handler(ws: WebSocketUpgrade, Path(session_id): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
	let room = state.hub.join(&session_id);
	ws.on_upgrade(move |socket| forward_room(socket, room))
}

// Every room event goes out as a JSON text frame. Client frames other than close are ignored.
async fn forward_room(socket: WebSocket, mut room: RoomReceiver) {
	let (mut sender, mut receiver) = socket.split();
	info!(session_id = room.room(), "websocket joined session room");

	loop {
		tokio::select! {
			event = room.recv() => {
				let Some(event) = event else {
					break;
				};
				let text = match serde_json::to_string(&event) {
					Ok(text) => text,
					Err(e) => {
						error!(session_id = room.room(), error = %e, "failed to serialize event");
						continue;
					}
				};
				if let Err(e) = sender.send(Message::Text(text)).await {
					debug!(session_id = room.room(), error = %e, "websocket send failed");
					break;
				}
			}
			incoming = receiver.next() => match incoming {
				Some(Ok(Message::Close(_)) | Err(_)) | None => break,
				Some(Ok(_)) => {}
			}
		}
	}

	info!(session_id = room.room(), "websocket left session room");
}
