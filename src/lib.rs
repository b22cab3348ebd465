pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod people;
pub mod rooms;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult, ChatError};

use auth::Authenticator;
use config::ChatConfig;
use people::Directory;
use rooms::Dispatcher;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub auth: Authenticator,
    pub directory: Directory,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Builds the shared state. The dispatcher, and the membership registry it
    /// owns, live exactly as long as the returned state.
    pub fn new(db_pool: SqlitePool, jwt_secret: &[u8], chat: ChatConfig) -> Self {
        let directory = Directory::new(db_pool.clone());
        let dispatcher = Arc::new(Dispatcher::new(db_pool.clone(), directory.clone(), chat));
        Self {
            db_pool,
            auth: Authenticator::new(jwt_secret),
            directory,
            dispatcher,
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .nest("/chat", rooms::router())
        .with_state(app_state)
}
