//! Friendlink Recommender
//!
//! HTTP entry point for friend recommendations.
//! Handles:
//! - Paginated friend-of-friend recommendations
//! - Rate limiting
//! - Liveness and readiness probes
//! - Observability (logging, metrics)

mod engine;
mod handlers;
mod middleware;

use axum::{routing::get, Router};
use engine::{EngineSettings, RecommendationEngine};
use friendlink_common::{
    config::AppConfig,
    db::DbPool,
    graph::{FriendshipGraphStore, InteractionScoreStore, RedisFriendStore, RedisInteractionStore},
    kv::RedisStore,
    members::{BlacklistGate, PgBlacklistGate, PgMemberSource, RecentMemberSource},
    metrics, observability, VERSION,
};
use handlers::health::Probe;
use middleware::rate_limit::RequestLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<RecommendationEngine>,
    pub probes: Arc<Vec<Arc<dyn Probe>>>,
    pub limiter: Option<Arc<RequestLimiter>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    // Initialize tracing and metrics
    observability::init_tracing(&config.observability);
    info!("Starting Friendlink Recommender v{}", VERSION);
    observability::install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    // Connect stores
    info!("Connecting to Redis...");
    let redis = RedisStore::connect(&config.redis).await.map_err(|e| {
        error!(error = %e, "Failed to connect to Redis");
        e
    })?;

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let friends: Arc<dyn FriendshipGraphStore> =
        Arc::new(RedisFriendStore::new(redis.clone(), &config.graph));
    let interactions: Arc<dyn InteractionScoreStore> = Arc::new(RedisInteractionStore::new(
        redis.clone(),
        config.interaction.clone(),
        &config.graph,
    ));
    let blacklist: Arc<dyn BlacklistGate> =
        Arc::new(PgBlacklistGate::new(db.clone(), config.graph.chunk_size));

    let limits = &config.recommendation;
    // Exclusions plus a filler window, its over-fetch and one lookahead row
    let max_scan = limits.max_candidates
        + limits.friend_sample_size
        + limits.max_fallback
        + limits.max_page_size
        + 1;
    let members: Arc<dyn RecentMemberSource> = Arc::new(PgMemberSource::new(db.clone(), max_scan));

    let engine = RecommendationEngine::new(
        friends,
        interactions,
        blacklist,
        members,
        EngineSettings::from(&config.recommendation),
    );

    let limiter = config
        .rate_limit
        .enabled
        .then(|| Arc::new(RequestLimiter::new(&config.rate_limit)));

    let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(redis), Arc::new(db)];
    let state = AppState {
        config: config.clone(),
        engine: Arc::new(engine),
        probes: Arc::new(probes),
        limiter,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut recommendations = Router::new().route(
        "/members/{id}/recommendations",
        get(handlers::recommendations::get_recommendations),
    );
    if let Some(limiter) = state.limiter.clone() {
        recommendations = recommendations.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit,
        ));
    }

    let api_routes = Router::new()
        // Health endpoints (never rate limited)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(recommendations);

    Router::new()
        .nest("/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
