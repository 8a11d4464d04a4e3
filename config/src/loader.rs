//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! All variables use the `POS_` prefix.

use crate::config::{
    BroadcastConfig, CacheConfig, GatewayConfig, GuardConfig, LogoutConfig, ObservabilityConfig,
    PosConfig, RetryConfig, default_broadcast_topic, default_cache_namespace,
    default_context_path, default_context_ttl, default_gateway_base_url, default_gateway_timeout,
    default_log_level, default_preserved_keys, default_secondary_resource_path,
    default_select_path, default_selection_retry, default_selection_route,
    default_transient_retry,
};
use std::env;
use std::path::PathBuf;

/// Load configuration from environment variables.
///
/// Environment variables override default values but can be overridden by
/// CLI arguments.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Gateway: {}", config.gateway.base_url);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Gateway
/// - `POS_GATEWAY_URL` (default: "http://localhost:8000")
/// - `POS_GATEWAY_TIMEOUT_SECONDS` (default: 10)
/// - `POS_GATEWAY_CONTEXT_PATH`, `POS_GATEWAY_SELECT_PATH`,
///   `POS_GATEWAY_OPENING_PATH`
/// - `POS_GATEWAY_TOKEN` (optional)
///
/// ### Cache
/// - `POS_CACHE_NAMESPACE` (default: "pos:")
/// - `POS_CACHE_TTL_SECONDS` (default: 28800, `0` disables expiry)
/// - `POS_STORAGE_DIR` (optional)
///
/// ### Guard
/// - `POS_SELECTION_RETRY_ATTEMPTS` / `POS_SELECTION_RETRY_DELAY_MS`
/// - `POS_TRANSIENT_RETRY_ATTEMPTS` / `POS_TRANSIENT_RETRY_DELAY_MS`
/// - `POS_SELECTION_ROUTE` (default: "/select-profile")
///
/// ### Broadcast / logout
/// - `POS_BROADCAST_TOPIC` (default: "pos-operational-context")
/// - `POS_BROADCAST_STORAGE_EVENTS`, `POS_BROADCAST_CHANNEL` (true/false)
/// - `POS_LOGOUT_PRESERVED_KEYS` (comma separated)
///
/// ### Observability
/// - `POS_LOG_LEVEL` (default: "info")
/// - `POS_LOG_JSON` (default: false)
/// - `POS_METRICS_ENABLED` (default: true)
pub fn load_from_env() -> Result<PosConfig, Box<dyn std::error::Error>> {
    let config = PosConfig {
        gateway: load_gateway_from_env()?,
        cache: load_cache_from_env()?,
        guard: load_guard_from_env()?,
        broadcast: load_broadcast_from_env()?,
        logout: load_logout_from_env()?,
        observability: load_observability_from_env()?,
    };

    Ok(config)
}

fn load_gateway_from_env() -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    Ok(GatewayConfig {
        base_url: env::var("POS_GATEWAY_URL").unwrap_or_else(|_| default_gateway_base_url()),
        timeout_seconds: parse_env("POS_GATEWAY_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| default_gateway_timeout()),
        context_path: env::var("POS_GATEWAY_CONTEXT_PATH")
            .unwrap_or_else(|_| default_context_path()),
        select_path: env::var("POS_GATEWAY_SELECT_PATH").unwrap_or_else(|_| default_select_path()),
        secondary_resource_path: env::var("POS_GATEWAY_OPENING_PATH")
            .unwrap_or_else(|_| default_secondary_resource_path()),
        api_token: env::var("POS_GATEWAY_TOKEN").ok(),
    })
}

fn load_cache_from_env() -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let context_ttl_seconds = match parse_env::<u64>("POS_CACHE_TTL_SECONDS") {
        Ok(0) => None,
        Ok(secs) => Some(secs),
        Err(_) => default_context_ttl(),
    };

    Ok(CacheConfig {
        namespace: env::var("POS_CACHE_NAMESPACE").unwrap_or_else(|_| default_cache_namespace()),
        context_ttl_seconds,
        storage_dir: env::var("POS_STORAGE_DIR").ok().map(PathBuf::from),
    })
}

fn load_guard_from_env() -> Result<GuardConfig, Box<dyn std::error::Error>> {
    let selection_default = default_selection_retry();
    let transient_default = default_transient_retry();

    Ok(GuardConfig {
        selection_retry: RetryConfig {
            max_attempts: parse_env("POS_SELECTION_RETRY_ATTEMPTS")
                .unwrap_or(selection_default.max_attempts),
            delay_ms: parse_env("POS_SELECTION_RETRY_DELAY_MS")
                .unwrap_or(selection_default.delay_ms),
        },
        transient_retry: RetryConfig {
            max_attempts: parse_env("POS_TRANSIENT_RETRY_ATTEMPTS")
                .unwrap_or(transient_default.max_attempts),
            delay_ms: parse_env("POS_TRANSIENT_RETRY_DELAY_MS")
                .unwrap_or(transient_default.delay_ms),
        },
        selection_route: env::var("POS_SELECTION_ROUTE")
            .unwrap_or_else(|_| default_selection_route()),
    })
}

fn load_broadcast_from_env() -> Result<BroadcastConfig, Box<dyn std::error::Error>> {
    Ok(BroadcastConfig {
        topic: env::var("POS_BROADCAST_TOPIC").unwrap_or_else(|_| default_broadcast_topic()),
        storage_events: parse_env("POS_BROADCAST_STORAGE_EVENTS").unwrap_or(true),
        broadcast_channel: parse_env("POS_BROADCAST_CHANNEL").unwrap_or(true),
    })
}

fn load_logout_from_env() -> Result<LogoutConfig, Box<dyn std::error::Error>> {
    let preserved_keys = match env::var("POS_LOGOUT_PRESERVED_KEYS") {
        Ok(raw) => raw
            .split(',')
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect(),
        Err(_) => default_preserved_keys(),
    };

    Ok(LogoutConfig { preserved_keys })
}

fn load_observability_from_env() -> Result<ObservabilityConfig, Box<dyn std::error::Error>> {
    Ok(ObservabilityConfig {
        log_level: env::var("POS_LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
        json_logs: parse_env("POS_LOG_JSON").unwrap_or(false),
        metrics_enabled: parse_env("POS_METRICS_ENABLED").unwrap_or(true),
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>),
    }
}
