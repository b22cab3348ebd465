use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{auth::{Caller, Identity}, AppState};

use super::{dispatch::Dispatcher, events::{ClientEvent, ServerEvent}, registry::Connection};

/// Live channel. The `Caller` extractor rejects bad credentials with 401
/// before the upgrade, so an unauthenticated socket never exists.
#[debug_handler(state = AppState)]
pub async fn chat_ws(
    Caller(identity): Caller,
    State(dispatcher): State<Arc<Dispatcher>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve(stream, identity, dispatcher))
}

async fn serve(stream: WebSocket, identity: Identity, dispatcher: Arc<Dispatcher>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = dispatcher.registry().connect(identity, tx);
    info!(conn = %conn.id, %identity, "connected");

    let (mut sender, mut receiver) = stream.split();

    let mut outbound_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    error!("encoding {event:?}: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                if !on_frame(&dispatcher, conn, frame).await {
                    break;
                }
            }
            _ = &mut outbound_task => break,
        }
    }

    dispatcher.registry().disconnect(conn.id);
    outbound_task.abort();
    info!(conn = %conn.id, %identity, "disconnected");
}

/// Returns false once the client has closed.
async fn on_frame(dispatcher: &Arc<Dispatcher>, conn: Connection, frame: Message) -> bool {
    let parsed = match &frame {
        Message::Text(text) => serde_json::from_str::<ClientEvent>(text.as_str()),
        Message::Binary(bytes) => serde_json::from_slice::<ClientEvent>(bytes),
        Message::Close(_) => return false,
        Message::Ping(_) | Message::Pong(_) => return true,
    };

    match parsed {
        Ok(event) => dispatcher.handle(conn, event).await,
        Err(err) => {
            debug!(conn = %conn.id, "bad frame: {err}");
            let event = ServerEvent::error(None, format!("bad frame: {err}"));
            dispatcher.registry().send_to(conn.id, event);
        }
    }
    true
}
