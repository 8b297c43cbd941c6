pub mod banners;
pub mod migrate;
pub mod tokens;
pub mod types;
pub mod versions;

pub use sqlx::postgres::PgPool;
pub use types::*;
