mod dispatch;
mod events;
mod msg;
mod new;
mod registry;
mod room;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use dispatch::Dispatcher;
pub use events::{ClientEvent, ServerEvent};
pub use msg::{history, mark_read};
pub use registry::{Connection, ConnectionId};
pub use room::{create_or_get, find, list_for, RoomDetail, RoomSummary};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(room::rooms).post(new::new_room))
        .route("/rooms/{room_id}", get(room::room))
        .route("/rooms/{room_id}/messages", get(msg::messages).post(msg::send_msg))
        .route("/ws", get(ws::chat_ws))
}
