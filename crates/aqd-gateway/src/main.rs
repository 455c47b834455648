use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use aqd_gateway::{AppState, router};
use aqd_platform::{ServiceConfig, connect_database};
use aqd_store::PgStore;
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "aqd_gateway=info,tower_http=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let catalog = Arc::new(config.load_catalog()?);
    let pool = connect_database(&config.database_url, config.max_connections).await?;
    let store = Arc::new(PgStore::new(pool));

    let state = AppState::from_store(store, catalog);
    let router = router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
