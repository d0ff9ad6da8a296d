pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod sql;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EngineError, EngineResult};

// Export engine entry points
pub use logic::{
    resolve_entity, update_entity, write_entity, BatchLoader, DynamicWriter, EntityPayload,
    LinkFields, Materializer, Resolved,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

/// Start the HTTP server against the configured PostgreSQL database.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;

    let postgres_store =
        crate::store::PostgresStore::new(&config.database_url(), config.max_connections()).await?;
    let store = Arc::new(postgres_store);

    let app = crate::api::routes::create_router().with_state(store);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
