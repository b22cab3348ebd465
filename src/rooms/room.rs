use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    appresult::ChatError,
    auth::{Caller, Identity, Role},
    db::{Room, Timestamp},
    people::{Directory, Profile},
    AppResult, AppState,
};

const ROOM_COLUMNS: &str = "id,patient_id,practitioner_id,last_message,last_message_at,created_at";

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: i64,
    pub counterpart_name: Option<String>,
    pub counterpart_avatar: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub counterpart: Option<Profile>,
}

#[derive(sqlx::FromRow)]
struct RoomWithUnread {
    #[sqlx(flatten)]
    room: Room,
    unread_count: i64,
}

/// Returns the room for the pair, creating it on first contact. The unique
/// (patient_id, practitioner_id) index makes concurrent first calls converge.
pub async fn create_or_get(
    db_pool: &SqlitePool,
    patient_id: i64,
    practitioner_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_rooms (patient_id,practitioner_id,created_at) VALUES (?,?,?)
         ON CONFLICT (patient_id,practitioner_id) DO NOTHING",
    )
    .bind(patient_id)
    .bind(practitioner_id)
    .bind(Timestamp::now())
    .execute(db_pool)
    .await?;

    let (room_id,): (i64,) =
        sqlx::query_as("SELECT id FROM chat_rooms WHERE patient_id=? AND practitioner_id=?")
            .bind(patient_id)
            .bind(practitioner_id)
            .fetch_one(db_pool)
            .await?;
    Ok(room_id)
}

pub async fn find(db_pool: &SqlitePool, room_id: i64) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id=?"))
        .bind(room_id)
        .fetch_optional(db_pool)
        .await
}

/// Loads the room if `identity` is its patient or its practitioner.
pub async fn authorize(
    db_pool: &SqlitePool,
    directory: &Directory,
    room_id: i64,
    identity: Identity,
) -> Result<Room, ChatError> {
    let Some(room) = find(db_pool, room_id).await? else {
        return Err(ChatError::RoomNotFound(room_id));
    };

    let side_id = directory.room_side_id(identity).await?;
    let own_side = match identity.role {
        Role::Patient => room.patient_id,
        Role::Practitioner => room.practitioner_id,
    };
    if side_id != Some(own_side) {
        return Err(ChatError::NotParticipant(room_id));
    }
    Ok(room)
}

/// Rooms the identity takes part in, most recently active first. Unread counts
/// only messages from the other side.
pub async fn list_for(
    db_pool: &SqlitePool,
    directory: &Directory,
    identity: Identity,
) -> Result<Vec<RoomSummary>, ChatError> {
    let Some(side_id) = directory.room_side_id(identity).await? else {
        return Ok(Vec::new());
    };

    let side_column = match identity.role {
        Role::Patient => "patient_id",
        Role::Practitioner => "practitioner_id",
    };
    let rows: Vec<RoomWithUnread> = sqlx::query_as(&format!(
        "SELECT {ROOM_COLUMNS},
            (SELECT COUNT(*) FROM messages m
             WHERE m.chat_room_id = chat_rooms.id AND m.sender_type = ? AND NOT m.is_read)
            AS unread_count
         FROM chat_rooms WHERE {side_column}=?
         ORDER BY last_message_at DESC, created_at DESC, id DESC"
    ))
    .bind(identity.role.counterpart())
    .bind(side_id)
    .fetch_all(db_pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for RoomWithUnread { room, unread_count } in rows {
        let counterpart = counterpart_profile(directory, &room, identity.role).await?;
        let (counterpart_name, counterpart_avatar) = match counterpart {
            Some(Profile { name, avatar }) => (Some(name), avatar),
            None => (None, None),
        };
        summaries.push(RoomSummary {
            room_id: room.id,
            counterpart_name,
            counterpart_avatar,
            last_message: room.last_message,
            last_message_at: room.last_message_at,
            created_at: room.created_at,
            unread_count,
        });
    }
    Ok(summaries)
}

async fn counterpart_profile(
    directory: &Directory,
    room: &Room,
    viewer: Role,
) -> Result<Option<Profile>, sqlx::Error> {
    match viewer {
        Role::Patient => directory.practitioner_profile(room.practitioner_id).await,
        Role::Practitioner => directory.patient_profile(room.patient_id).await,
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn rooms(
    Caller(identity): Caller,
    State(db_pool): State<SqlitePool>,
    State(directory): State<Directory>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(list_for(&db_pool, &directory, identity).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    Caller(identity): Caller,
    State(db_pool): State<SqlitePool>,
    State(directory): State<Directory>,
    Path(room_id): Path<i64>,
) -> AppResult<Json<RoomDetail>> {
    let room = authorize(&db_pool, &directory, room_id, identity).await?;
    let counterpart = counterpart_profile(&directory, &room, identity.role).await?;
    Ok(Json(RoomDetail { room, counterpart }))
}
