use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bulletin_api::announcements;
use bulletin_api::auth::{self, AppState, AppStateInner};
use bulletin_api::groups;
use bulletin_api::middleware::require_auth;
use bulletin_api::polls;
use bulletin_api::reactions;
use bulletin_api::storage::Storage;

/// 50 MB cap on announcement uploads.
const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulletin=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("BULLETIN_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("BULLETIN_DB_PATH").unwrap_or_else(|_| "bulletin.db".into());
    let upload_dir = std::env::var("BULLETIN_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
    let host = std::env::var("BULLETIN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("BULLETIN_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database and attachment storage
    let db = bulletin_db::Database::open(&PathBuf::from(&db_path))?;
    let storage = Storage::new(PathBuf::from(&upload_dir)).await?;

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, storage, jwt_secret });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/groups", post(groups::create_group))
        .route("/groups/join", post(groups::join_group))
        .route("/groups/my", get(groups::my_groups))
        .route("/groups/{group_id}/announcements", post(announcements::create_announcement))
        .route("/groups/{group_id}/announcements", get(announcements::list_announcements))
        .route("/announcements/react", post(reactions::react))
        .route("/announcements/vote", post(polls::vote))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Bulletin server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
