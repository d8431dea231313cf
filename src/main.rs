use std::net::SocketAddr;
use std::sync::Arc;

use ows_board::{config::Settings, init_db, make_router, run_app, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = match init_db(&db_url).await {
        Ok(pool) => pool,
        Err(error) => {
            tracing::error!(%error, "database initialisation failed");
            std::process::exit(1);
        }
    };
    let state = Arc::new(AppState::new(pool, Settings::from_env()));
    let router = make_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3001));
    tracing::info!(%addr, "server started");
    if let Err(error) = run_app(router, addr).await {
        tracing::error!(%error, "server exited");
    }
}
