use banner_cache::BannerCache;
use sqlx::postgres::PgPool;

/// Shared application state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: BannerCache,
}
