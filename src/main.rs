use axum::http::HeaderValue;
use clinic_chat::{config::Config, db, AppState};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_chat=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = db::connect(&config.database_url, config.max_connections).await?;
    let app_state = AppState::new(db_pool, config.jwt_secret.as_bytes(), config.chat);

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = clinic_chat::app(app_state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("chat service listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
