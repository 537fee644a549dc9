//! Bookstore Sales - HTTP service

use std::sync::Arc;

use anyhow::Result;
use bookstore_sales::api::{self, AppState};
use bookstore_sales::publisher::{EventPublisher, LogPublisher, NatsPublisher};
use bookstore_sales::repository::{postgres, PgRepository};
use bookstore_sales::{Bookstore, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    bookstore_sales::init_tracing();

    let pool = postgres::connect(&config.database_url, config.db_max_connections).await?;
    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, logging events instead");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let store = Bookstore::new(Arc::new(PgRepository::new(pool)), events, config.settings);
    let app = api::router(AppState { store });

    let addr = config.listen_addr();
    tracing::info!(stock_policy = %config.settings.stock_policy, "🚀 Bookstore Sales listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
