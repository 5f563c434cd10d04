use relay::{
    diagnostics::{DiagnosticsConfig, DiagnosticsRunner},
    dispatcher::{Dispatcher, DispatcherConfig, build_client},
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:relay.db".to_string());
    let bind_addr =
        std::env::var("RELAY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let admin_api_token = std::env::var("RELAY_ADMIN_API_TOKEN").ok();

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&pool)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let dispatcher_config = DispatcherConfig::from_env();
    let client = build_client(&dispatcher_config)?;
    let dispatcher = Dispatcher::new(pool.clone(), client.clone(), dispatcher_config);
    let diagnostics = DiagnosticsRunner::new(pool.clone(), client, DiagnosticsConfig::from_env());

    let state = AppState {
        pool,
        dispatcher,
        diagnostics,
        admin_api_token,
    };

    let app = relay::app(state);

    let addr: SocketAddr = bind_addr.parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
