use std::env;
use std::time::Duration;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    /// `None` disables TTL expiry; entries then age out by frequency only
    pub cache_ttl: Option<Duration>,
    /// `None` disables the periodic eviction sweep
    pub sweep_interval: Option<Duration>,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3010);

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/banners".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]);

        let cache_ttl = duration_secs(env::var("CACHE_TTL_SECS").ok(), 300);
        let sweep_interval = duration_secs(env::var("CACHE_SWEEP_SECS").ok(), 600);

        Self {
            port,
            database_url,
            cors_origins,
            cache_ttl,
            sweep_interval,
        }
    }
}

/// Seconds-valued setting; unset or unparsable falls back to the default,
/// zero disables the feature
fn duration_secs(value: Option<String>, default_secs: u64) -> Option<Duration> {
    let secs = value
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_setting_defaults_when_unset() {
        assert_eq!(duration_secs(None, 300), Some(Duration::from_secs(300)));
    }

    #[test]
    fn duration_setting_zero_disables() {
        assert_eq!(duration_secs(Some("0".into()), 300), None);
    }

    #[test]
    fn duration_setting_parses_override() {
        assert_eq!(
            duration_secs(Some("42".into()), 300),
            Some(Duration::from_secs(42))
        );
    }

    #[test]
    fn duration_setting_ignores_garbage() {
        assert_eq!(
            duration_secs(Some("soon".into()), 300),
            Some(Duration::from_secs(300))
        );
    }
}
