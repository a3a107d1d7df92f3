// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;
#[cfg(test)]
mod test_helpers;

use crate::config::AppConfig;
use crate::services::{
    ActionLog, EvictionPolicy, ImageCodec, InMemoryResultStore, InpaintingClient,
    ProcessingOrchestrator, RedisResultStore, ReplicateClient, ResultStore,
};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ProcessingOrchestrator>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config.log_level.as_str()));

    info!("Starting maskedit service...");

    // Initialize services
    let actions = Arc::new(
        ActionLog::open(config.action_log_path.clone(), config.action_log_cap)
            .await
            .with_context(|| {
                format!("opening action log {}", config.action_log_path.display())
            })?,
    );

    let results: Arc<dyn ResultStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisResultStore::new(url, config.result_ttl_secs)
                .await
                .with_context(|| format!("connecting to result store at {}", url))?;
            info!("Results stored in Redis with a {}s TTL", config.result_ttl_secs);
            Arc::new(store)
        }
        None => {
            let policy = config
                .result_store_max_entries
                .map(EvictionPolicy::MaxEntries)
                .unwrap_or_default();
            info!("Results stored in memory ({:?})", policy);
            Arc::new(InMemoryResultStore::new(policy))
        }
    };

    let http = reqwest::Client::new();
    let client: Arc<dyn InpaintingClient> =
        Arc::new(ReplicateClient::new(&config.replicate, http.clone()));
    if !client.is_configured() {
        warn!("REPLICATE_API_KEY is not set; process calls will fail until it is");
    }

    let orchestrator = ProcessingOrchestrator::new(
        ImageCodec::new(config.max_file_size),
        client,
        results,
        actions,
        http,
    )
    .with_timeout(config.inpaint_timeout);

    let app_state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    // Base64 inflates payloads by 4/3, plus room for the rest of the body.
    let json_limit = config.max_file_size / 3 * 4 + 64 * 1024;
    let bind_address = config.bind_address();
    info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(handlers::json_config(json_limit))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("binding {}", bind_address))?
    .run()
    .await?;

    Ok(())
}
