use actix_web::{web, App, HttpServer};
use bus_tracker::api;
use bus_tracker::middlewares::RequestLogger;
use bus_tracker::store::{MemoryStore, PgStore, Seed, TrackerStore};
use bus_tracker::{Config, Tracker, TrackerResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn open_store(config: &Config) -> TrackerResult<Arc<dyn TrackerStore>> {
    if let Some(url) = &config.database.url {
        info!("Using PostgreSQL store");
        return Ok(Arc::new(PgStore::connect(url).await?));
    }

    match &config.database.seed_file {
        Some(path) => {
            info!("Using in-memory store seeded from {}", path.display());
            Ok(Arc::new(MemoryStore::from_seed(Seed::from_file(path)?)))
        }
        None => {
            info!("Using empty in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> TrackerResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    let store = open_store(&config).await?;

    let bind = (config.server.host.clone(), config.server.port);
    let workers = config.server.workers;
    let slow_after = Duration::from_millis(config.server.slow_request_ms);
    let tracker = Arc::new(Tracker::new(store, config));

    info!("Listening on {}:{} with {} workers", bind.0, bind.1, workers);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(tracker.clone()))
            .wrap(RequestLogger::slow_after(slow_after))
            .configure(api::config)
    })
    .workers(workers)
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
