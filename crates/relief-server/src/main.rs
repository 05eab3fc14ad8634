mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use relief_api::auth::{self, AppState, AppStateInner};
use relief_db::{Database, NewUser};
use relief_gateway::Dispatcher;
use relief_gateway::connection::{self, AccountLookup};
use relief_types::models::Role;

use config::{Config, SeedAdmin};

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
    accounts: Arc<dyn AccountLookup>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relief=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    if let Some(seed) = &config.seed_admin {
        seed_admin(&db, seed).await?;
    }

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            jwt_secret: config.jwt_secret.clone(),
            accounts: app_state.clone(),
        });

    let app = relief_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Relief server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret, state.accounts)
    })
}

/// Create the configured admin account unless that email is already registered.
async fn seed_admin(db: &Database, seed: &SeedAdmin) -> anyhow::Result<()> {
    if db.email_taken(&seed.email)? {
        return Ok(());
    }

    let password_hash = auth::hash_password(seed.password.clone()).await?;
    let admin = db.create_user(&NewUser {
        id: Uuid::new_v4(),
        name: "Administrator".to_string(),
        email: seed.email.clone(),
        password_hash,
        role: Role::Admin,
        is_verified: true,
        phone: None,
        address: None,
        ngo_details: None,
        skills: Vec::new(),
        availability: None,
        affected_details: None,
    })?;

    info!("Seeded admin account {} ({})", admin.email, admin.id);
    Ok(())
}
