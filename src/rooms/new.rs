use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    appresult::ChatError,
    auth::{Caller, Role},
    people::Directory,
    AppResult, AppState,
};

use super::room;

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    practitioner_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRoom {
    room_id: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    Caller(identity): Caller,
    State(db_pool): State<SqlitePool>,
    State(directory): State<Directory>,
    Json(NewRoomQuery { practitioner_id }): Json<NewRoomQuery>,
) -> AppResult<Json<NewRoom>> {
    if identity.role != Role::Patient {
        return Err(ChatError::PatientsOnly.into());
    }
    if directory.practitioner_identity(practitioner_id).await?.is_none() {
        return Err(ChatError::PractitionerNotFound(practitioner_id).into());
    }

    let room_id = room::create_or_get(&db_pool, identity.id, practitioner_id).await?;
    tracing::debug!(room_id, %identity, practitioner_id, "room ready");

    Ok(Json(NewRoom { room_id }))
}
