mod auth;
mod config;
mod error;
mod routes;
mod state;

use axum::http::{header, Method};
use axum::routing::{get, patch};
use axum::Router;
use banner_cache::BannerCache;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banner_api=info".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    info!(port = config.port, "Starting banner-api");

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    banner_db::migrate::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    let cache = BannerCache::new(config.cache_ttl, config.sweep_interval);

    let state = AppState {
        pool,
        cache: cache.clone(),
    };

    // CORS
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // User-facing banner read
        .route("/user_banner", get(routes::banners::get_user_banner))
        // Admin banner management
        .route(
            "/banner",
            get(routes::banners::list_banners)
                .post(routes::banners::create_banner)
                .delete(routes::banners::delete_by_query),
        )
        .route(
            "/banner/{id}",
            patch(routes::banners::update_banner).delete(routes::banners::delete_banner),
        )
        .route("/banner/{id}/versions", get(routes::banners::list_versions))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("Failed to bind");

    info!(port = config.port, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    // Stop the cache sweep task before the runtime winds down
    cache.shutdown();
    info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
