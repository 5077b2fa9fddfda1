use crate::Router;
use crate::signaling::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use parley_core::{PeerId, SignalMessage};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.router))
}

async fn handle_socket(socket: WebSocket, router: Router) {
    info!("new transport link");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalMessage>();
    let link = tx.clone();

    // Written by the recv task on each successful join, read after
    // teardown so an abrupt close still unregisters the peer.
    let bound: Arc<Mutex<Option<PeerId>>> = Arc::new(Mutex::new(None));

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to serialize signal message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let router = router.clone();
        let bound = bound.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            // A link binds to one peer id for its
                            // lifetime; a join under a different id is
                            // invalid input and never reaches the router.
                            if let SignalMessage::JoinRoom { peer_id, .. } = &signal {
                                let previous =
                                    bound.lock().ok().and_then(|slot| slot.as_ref().cloned());
                                if previous.as_ref().is_some_and(|p| p != peer_id) {
                                    warn!(
                                        "link bound to {} sent join-room as {}, dropped",
                                        previous.unwrap_or_else(|| "?".into()),
                                        peer_id
                                    );
                                    continue;
                                }
                            }
                            if let Some(peer_id) = router.handle_message(&tx, signal) {
                                if let Ok(mut slot) = bound.lock() {
                                    *slot = Some(peer_id);
                                }
                            }
                        }
                        // Malformed payloads are dropped; the link stays open.
                        Err(e) => warn!("malformed signal message dropped: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    if let Some(peer_id) = bound.lock().ok().and_then(|mut slot| slot.take()) {
        router.disconnect_link(&peer_id, &link);
    }
    info!("transport link closed");
}
