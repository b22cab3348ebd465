use std::sync::Arc;

use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::{Caller, Identity, Role},
    db::{truncate, Message, Room, Timestamp},
    people::Directory,
    AppResult, AppState,
};

use super::{dispatch::Dispatcher, room};

const MESSAGE_COLUMNS: &str = "id,chat_room_id,sender_id,sender_type,body,is_read,created_at";
const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// Appends a message and moves the room's last-message summary to it, in one
/// transaction. Callers serialize per room so the summary always matches the
/// newest row.
pub async fn insert(
    db_pool: &SqlitePool,
    room: &Room,
    sender: Identity,
    body: &str,
    preview_len: usize,
) -> Result<Message, sqlx::Error> {
    // clock skew must not put a message before its room
    let created_at = Timestamp::now().max(room.created_at);

    let mut tx = db_pool.begin().await?;
    let id = sqlx::query(
        "INSERT INTO messages (chat_room_id,sender_id,sender_type,body,is_read,created_at)
         VALUES (?,?,?,?,FALSE,?)",
    )
    .bind(room.id)
    .bind(sender.id)
    .bind(sender.role)
    .bind(body)
    .bind(created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE chat_rooms SET last_message=?, last_message_at=? WHERE id=?")
        .bind(truncate(body, preview_len))
        .bind(created_at)
        .bind(room.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Message {
        id,
        room_id: room.id,
        sender_id: sender.id,
        sender_role: sender.role,
        body: body.to_owned(),
        is_read: false,
        created_at,
    })
}

/// Flips every unread message the other side sent into `room_id`.
pub async fn mark_read(
    conn: &mut SqliteConnection,
    room_id: i64,
    reader: Role,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE messages SET is_read=TRUE WHERE chat_room_id=? AND sender_type=? AND NOT is_read",
    )
    .bind(room_id)
    .bind(reader.counterpart())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// A page of history, oldest first, read by `reader`. The read flags are
/// updated in the same transaction, so the page already reflects them.
pub async fn history(
    db_pool: &SqlitePool,
    room_id: i64,
    reader: Role,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<Message>, sqlx::Error> {
    let mut tx = db_pool.begin().await?;
    let marked = mark_read(&mut tx, room_id, reader).await?;

    let mut messages: Vec<Message> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE chat_room_id=? AND id<? ORDER BY id DESC LIMIT ?"
    ))
    .bind(room_id)
    .bind(before.unwrap_or(i64::MAX))
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    if marked > 0 {
        tracing::debug!(room_id, %reader, marked, "marked read");
    }

    messages.reverse();
    Ok(messages)
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    before: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageQuery {
    body: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    Caller(identity): Caller,
    State(db_pool): State<SqlitePool>,
    State(directory): State<Directory>,
    Path(room_id): Path<i64>,
    Query(HistoryQuery { before, limit }): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    room::authorize(&db_pool, &directory, room_id, identity).await?;

    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    Ok(Json(history(&db_pool, room_id, identity.role, before, limit).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_msg(
    Caller(identity): Caller,
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(room_id): Path<i64>,
    Json(SendMessageQuery { body }): Json<SendMessageQuery>,
) -> AppResult<Json<Message>> {
    Ok(Json(dispatcher.send(identity, room_id, body).await?))
}
