//! Configuration management for the viewer core
//!
//! Values come from `DOCMARK_*` environment variables (a `.env` file is
//! honoured) and fall back to the defaults below.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Base URL of the remote annotation service
    pub api_base_url: String,
    pub database: DatabaseConfig,
    /// Stamped on optimistic records as `organizationId`
    pub organization_id: String,
    /// Stamped on optimistic records as `createdBy`
    pub user_id: String,
    /// Document-space distance a pointer must travel before a press becomes a drag
    pub drag_threshold: f64,
    pub flash_duration: Duration,
    /// Delay before a consumed navigation target is cleared
    pub nav_clear_delay: Duration,
    /// Delay between a page change and scrolling to the annotation
    pub scroll_delay: Duration,
    pub render_timeout: Duration,
    pub load_timeout: Duration,
    /// Number of pages kept in the text-run cache
    pub text_cache_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            api_base_url: "http://localhost:3000".to_string(),
            database: DatabaseConfig {
                url: "sqlite:./docmark.db".to_string(),
            },
            organization_id: "default-org".to_string(),
            user_id: "anonymous".to_string(),
            drag_threshold: 2.0,
            flash_duration: Duration::from_millis(2000),
            nav_clear_delay: Duration::from_millis(1000),
            scroll_delay: Duration::from_millis(300),
            render_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(30),
            text_cache_size: 200,
        }
    }
}

impl ViewerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ViewerConfig::default();

        let config = ViewerConfig {
            api_base_url: lookup("DOCMARK_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            database: DatabaseConfig {
                url: lookup("DOCMARK_DATABASE_URL").unwrap_or(defaults.database.url),
            },
            organization_id: lookup("DOCMARK_ORGANIZATION_ID").unwrap_or(defaults.organization_id),
            user_id: lookup("DOCMARK_USER_ID").unwrap_or(defaults.user_id),
            drag_threshold: parse_var(&lookup, "DOCMARK_DRAG_THRESHOLD", defaults.drag_threshold)?,
            flash_duration: millis_var(&lookup, "DOCMARK_FLASH_MS", defaults.flash_duration)?,
            nav_clear_delay: millis_var(&lookup, "DOCMARK_NAV_CLEAR_MS", defaults.nav_clear_delay)?,
            scroll_delay: millis_var(&lookup, "DOCMARK_SCROLL_DELAY_MS", defaults.scroll_delay)?,
            render_timeout: secs_var(&lookup, "DOCMARK_RENDER_TIMEOUT_SECS", defaults.render_timeout)?,
            load_timeout: secs_var(&lookup, "DOCMARK_LOAD_TIMEOUT_SECS", defaults.load_timeout)?,
            text_cache_size: parse_var(&lookup, "DOCMARK_TEXT_CACHE_SIZE", defaults.text_cache_size)?,
        };

        if !(config.drag_threshold.is_finite() && config.drag_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                key: "DOCMARK_DRAG_THRESHOLD".to_string(),
                value: config.drag_threshold.to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn millis_var<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}

fn secs_var<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ViewerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.drag_threshold, 2.0);
        assert_eq!(config.flash_duration, Duration::from_millis(2000));
        assert_eq!(config.nav_clear_delay, Duration::from_millis(1000));
        assert_eq!(config.scroll_delay, Duration::from_millis(300));
    }

    #[test]
    fn test_overrides() {
        let config = ViewerConfig::from_lookup(lookup_from(&[
            ("DOCMARK_API_BASE_URL", "https://api.example.com/"),
            ("DOCMARK_USER_ID", "user-7"),
            ("DOCMARK_DRAG_THRESHOLD", "4.5"),
            ("DOCMARK_RENDER_TIMEOUT_SECS", "5"),
            ("DOCMARK_TEXT_CACHE_SIZE", "16"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.user_id, "user-7");
        assert_eq!(config.drag_threshold, 4.5);
        assert_eq!(config.render_timeout, Duration::from_secs(5));
        assert_eq!(config.text_cache_size, 16);
    }

    #[test]
    fn test_invalid_value_rejected() {
        let err = ViewerConfig::from_lookup(lookup_from(&[("DOCMARK_FLASH_MS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::Invalid { key, value } => {
                assert_eq!(key, "DOCMARK_FLASH_MS");
                assert_eq!(value, "soon");
            }
        }

        assert!(ViewerConfig::from_lookup(lookup_from(&[("DOCMARK_DRAG_THRESHOLD", "-1")])).is_err());
    }
}
