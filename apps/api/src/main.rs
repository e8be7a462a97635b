mod analyzer;
mod cache;
mod config;
mod coverage;
mod db;
mod errors;
mod llm_client;
mod models;
mod planner;
mod retrieval;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::content::SectionContentCache;
use crate::cache::inflight::{Inflight, RedisInflight, INFLIGHT_TTL_SECS};
use crate::cache::store::{CacheStore, PgCacheStore};
use crate::cache::structure::TopicStructureCache;
use crate::config::{Config, RoleTemplates};
use crate::db::create_pool;
use crate::llm_client::{AnthropicClient, GenerativeClient, CONTENT_MODEL, STRUCTURAL_MODEL};
use crate::retrieval::{HttpRetriever, Retriever};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Compass API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;

    // Initialize Redis (in-flight generation sentinels)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Role templates are operator-editable config, not compiled-in
    let role_templates = Arc::new(RoleTemplates::load(&config.role_templates_path)?);
    info!("Loaded {} role templates", role_templates.len());
    if role_templates.is_empty() {
        warn!("Role template set is empty — every cache key will be hash-keyed");
    }

    // Initialize LLM client (both tiers share one transport)
    let llm: Arc<dyn GenerativeClient> =
        Arc::new(AnthropicClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (structural: {STRUCTURAL_MODEL}, content: {CONTENT_MODEL})");

    // Initialize vector retrieval client
    let retriever: Arc<dyn Retriever> = Arc::new(HttpRetriever::new(
        config.retrieval_endpoint.clone(),
        config.retrieval_api_key.clone(),
    ));
    info!(
        "Retrieval client initialized ({} namespaces)",
        config.namespaces.len()
    );

    // Wire the content caches: durable store + in-flight sentinels + tiers
    let store: Arc<dyn CacheStore> = Arc::new(PgCacheStore::new(pool.clone()));
    let inflight: Arc<dyn Inflight> = Arc::new(RedisInflight::new(redis, INFLIGHT_TTL_SECS));
    let structure_cache = Arc::new(TopicStructureCache::new(
        store.clone(),
        llm.clone(),
        inflight.clone(),
        role_templates.clone(),
    ));
    let content_cache = Arc::new(SectionContentCache::new(
        store,
        llm.clone(),
        inflight,
        role_templates.clone(),
    ));

    // Build app state
    let state = AppState {
        db: pool,
        llm,
        retriever,
        structure_cache,
        content_cache,
        role_templates,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
