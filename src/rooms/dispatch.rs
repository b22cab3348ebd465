//! Turns live-channel events into persisted messages and fan-out.
//!
//! Every send into a room runs under that room's lock: the insert, the
//! last-message update and the broadcast to joined connections happen as one
//! step, so all members observe a room's messages in insertion order. Rooms
//! never wait on each other.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{
    appresult::ChatError,
    auth::{Identity, Role},
    config::ChatConfig,
    db::{truncate, Message, Room},
    people::Directory,
};

use super::{
    events::{ClientEvent, ServerEvent},
    msg, room,
    registry::{Connection, Registry},
};

pub struct Dispatcher {
    db_pool: SqlitePool,
    directory: Directory,
    registry: Registry,
    room_locks: DashMap<i64, Arc<Mutex<()>>>,
    config: ChatConfig,
}

impl Dispatcher {
    pub fn new(db_pool: SqlitePool, directory: Directory, config: ChatConfig) -> Self {
        Self {
            db_pool,
            directory,
            registry: Registry::new(),
            room_locks: DashMap::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs one client event. A failure is reported to `conn` alone as an
    /// `error` event; the connection stays usable.
    pub async fn handle(self: &Arc<Self>, conn: Connection, event: ClientEvent) {
        let result = match event {
            ClientEvent::Join { room_id } => {
                self.join(conn, room_id).await.map_err(|err| (room_id, err))
            }
            ClientEvent::Leave { room_id } => {
                self.leave(conn, room_id);
                Ok(())
            }
            ClientEvent::Send { room_id, body } => self
                .send(conn.identity, room_id, body)
                .await
                .map(drop)
                .map_err(|err| (room_id, err)),
            ClientEvent::Typing { room_id, is_typing } => {
                self.typing(conn, room_id, is_typing);
                Ok(())
            }
        };

        if let Err((room_id, err)) = result {
            if err.status().is_server_error() {
                error!(conn = %conn.id, identity = %conn.identity, room_id, "{err:?}");
            } else {
                debug!(conn = %conn.id, identity = %conn.identity, room_id, "rejected: {err}");
            }
            self.registry.send_to(conn.id, ServerEvent::error(Some(room_id), err));
        }
    }

    pub async fn join(&self, conn: Connection, room_id: i64) -> Result<(), ChatError> {
        room::authorize(&self.db_pool, &self.directory, room_id, conn.identity).await?;

        if self.registry.join(conn.id, room_id) {
            debug!(conn = %conn.id, room_id, "joined");
        }
        self.registry.send_to(conn.id, ServerEvent::Joined { room_id });
        Ok(())
    }

    pub fn leave(&self, conn: Connection, room_id: i64) {
        if self.registry.leave(conn.id, room_id) {
            debug!(conn = %conn.id, room_id, "left");
        }
        self.registry.send_to(conn.id, ServerEvent::Left { room_id });
    }

    /// Relays to the other connections in the room. Nothing is stored.
    pub fn typing(&self, conn: Connection, room_id: i64, is_typing: bool) {
        if !self.registry.is_joined(conn.id, room_id) {
            debug!(conn = %conn.id, room_id, "typing outside a joined room dropped");
            return;
        }

        let event = ServerEvent::UserTyping {
            room_id,
            user_id: conn.identity.id,
            role: conn.identity.role,
            is_typing,
        };
        self.registry.broadcast(room_id, &event, Some(conn.id));
    }

    /// Persists a message from `sender`, broadcasts it to the room and
    /// notifies the counterpart.
    ///
    /// The sender is never taken from the client payload. Once persistence
    /// has started it runs to completion on its own task, even if the caller
    /// goes away.
    pub async fn send(
        self: &Arc<Self>,
        sender: Identity,
        room_id: i64,
        body: String,
    ) -> Result<Message, ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let room = room::authorize(&self.db_pool, &self.directory, room_id, sender).await?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let message = this.persist_and_broadcast(&room, sender, &body).await?;
            this.notify_counterpart(&room, &message).await;
            Ok::<_, ChatError>(message)
        })
        .await?
    }

    async fn persist_and_broadcast(
        &self,
        room: &Room,
        sender: Identity,
        body: &str,
    ) -> Result<Message, ChatError> {
        let lock = self.room_locks.entry(room.id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.insert_and_broadcast(room, sender, body).await
        };

        // pruned whether or not the insert went through
        drop(lock);
        self.room_locks.remove_if(&room.id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Caller holds the room lock.
    async fn insert_and_broadcast(
        &self,
        room: &Room,
        sender: Identity,
        body: &str,
    ) -> Result<Message, ChatError> {
        let message = msg::insert(&self.db_pool, room, sender, body, self.config.preview_len)
            .await
            .inspect_err(|err| {
                error!(room_id = room.id, identity = %sender, "persisting message: {err}")
            })?;

        let event = ServerEvent::NewMessage { message: message.clone() };
        let delivered = self.registry.broadcast(room.id, &event, None);
        debug!(room_id = room.id, message_id = message.id, delivered, "broadcast");
        Ok(message)
    }

    /// Best effort: a counterpart that can't be resolved is logged and skipped.
    async fn notify_counterpart(&self, room: &Room, message: &Message) {
        let counterpart = match message.sender_role {
            Role::Practitioner => Identity { id: room.patient_id, role: Role::Patient },
            Role::Patient => {
                let practitioner_id = room.practitioner_id;
                match self.directory.practitioner_identity(practitioner_id).await {
                    Ok(Some(id)) => Identity { id, role: Role::Practitioner },
                    Ok(None) => {
                        warn!(room_id = room.id, practitioner_id, "no practitioner login, skipped");
                        return;
                    }
                    Err(err) => {
                        warn!(room_id = room.id, practitioner_id, "resolving practitioner: {err}");
                        return;
                    }
                }
            }
        };

        let event = ServerEvent::NewMessageNotification {
            room_id: room.id,
            sender_id: message.sender_id,
            sender_role: message.sender_role,
            preview: truncate(&message.body, self.config.notify_preview_len),
            created_at: message.created_at,
        };
        let delivered = self.registry.notify(counterpart, &event);
        debug!(room_id = room.id, %counterpart, delivered, "notified");
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::mpsc;

    use super::*;
    use crate::db;

    async fn dispatcher() -> Arc<Dispatcher> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::migrate(&db_pool).await.unwrap();
        let directory = Directory::new(db_pool.clone());
        Arc::new(Dispatcher::new(db_pool, directory, ChatConfig::default()))
    }

    #[tokio::test]
    async fn room_lock_is_released_when_insert_fails() {
        let dispatcher = dispatcher().await;
        let room_id = room::create_or_get(&dispatcher.db_pool, 1, 100).await.unwrap();
        sqlx::query("DROP TABLE messages").execute(&dispatcher.db_pool).await.unwrap();

        let patient = Identity { id: 1, role: Role::Patient };
        let err = dispatcher.send(patient, room_id, "hello".into()).await.unwrap_err();

        assert!(matches!(err, ChatError::Storage(_)));
        assert!(dispatcher.room_locks.is_empty());
    }

    #[tokio::test]
    async fn room_lock_is_released_after_send() {
        let dispatcher = dispatcher().await;
        let room_id = room::create_or_get(&dispatcher.db_pool, 1, 100).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let patient = Identity { id: 1, role: Role::Patient };
        dispatcher.registry().connect(patient, tx);

        dispatcher.send(patient, room_id, "hello".into()).await.unwrap();

        assert!(dispatcher.room_locks.is_empty());
    }
}
