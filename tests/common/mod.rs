#![allow(dead_code)]

use clinic_chat::{
    auth::{Claims, Identity, Role},
    config::ChatConfig,
    db,
    rooms::{Connection, ServerEvent},
    AppState,
};
use jsonwebtoken::get_current_timestamp;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const SECRET: &[u8] = b"test-secret";

pub const LAN: Identity = Identity { id: 1, role: Role::Patient };
pub const MINH: Identity = Identity { id: 2, role: Role::Patient };
/// Login identity of practitioner record 100.
pub const DR_HOA: Identity = Identity { id: 10, role: Role::Practitioner };
/// Login identity of practitioner record 101.
pub const DR_TUAN: Identity = Identity { id: 11, role: Role::Practitioner };

pub const HOA_RECORD: i64 = 100;
pub const TUAN_RECORD: i64 = 101;

pub async fn pool() -> SqlitePool {
    // a single connection keeps every query on the same in-memory database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    seed(&db_pool).await;
    db_pool
}

/// A database file shared by several pooled connections, so concurrent
/// queries really race inside SQLite. Keep the `TempDir` alive for the test.
pub async fn file_pool(connections: u32) -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("chat.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(connections)
        .connect_with(options)
        .await
        .unwrap();
    seed(&db_pool).await;
    (db_pool, dir)
}

async fn seed(db_pool: &SqlitePool) {
    db::migrate(db_pool).await.unwrap();

    sqlx::query(
        "INSERT INTO users (id,full_name,avatar) VALUES
            (1,'Lan Nguyen',NULL), (2,'Minh Tran',NULL),
            (10,'Dr. Hoa Le','hoa.png'), (11,'Dr. Tuan Pham',NULL)",
    )
    .execute(db_pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO doctors (id,user_id) VALUES (100,10), (101,11)")
        .execute(db_pool)
        .await
        .unwrap();
}

pub async fn state() -> AppState {
    state_with(ChatConfig::default()).await
}

pub async fn state_with(chat: ChatConfig) -> AppState {
    AppState::new(pool().await, SECRET, chat)
}

pub async fn file_state(connections: u32) -> (AppState, TempDir) {
    let (db_pool, dir) = file_pool(connections).await;
    (AppState::new(db_pool, SECRET, ChatConfig::default()), dir)
}

pub fn token(state: &AppState, identity: Identity) -> String {
    let role = match identity.role {
        Role::Patient => None,
        Role::Practitioner => Some("doctor".to_owned()),
    };
    let claims = Claims { id: identity.id, role, exp: get_current_timestamp() + 3600 };
    state.auth.issue(&claims).unwrap()
}

pub fn connect(
    state: &AppState,
    identity: Identity,
) -> (Connection, UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (state.dispatcher.registry().connect(identity, tx), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn new_messages(events: &[ServerEvent]) -> Vec<(i64, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::NewMessage { message } => Some((message.id, message.body.clone())),
            _ => None,
        })
        .collect()
}

pub async fn message_count(db_pool: &SqlitePool, room_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_room_id=?")
        .bind(room_id)
        .fetch_one(db_pool)
        .await
        .unwrap();
    count
}
