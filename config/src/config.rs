//! # Configuration Structures
//!
//! All configuration structures for a terminal session.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization with per-field defaults
//! - Use `validator` for input validation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Upper bound on the total time a retry policy may spend sleeping, so a
/// guard never looks hung while it is still `Loading`.
pub const MAX_RETRY_BUDGET_MS: u64 = 5_000;

/// Main configuration structure for a terminal session.
///
/// ## Fields
/// - `gateway`: Server context endpoints
/// - `cache`: Client-side cache namespace, TTL and storage location
/// - `guard`: Retry bounds and selection redirect route
/// - `broadcast`: Cross-tab transports
/// - `logout`: Keys that survive a logout purge
/// - `observability`: Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct PosConfig {
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate(nested)]
    pub guard: GuardConfig,

    #[serde(default)]
    #[validate(nested)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub logout: LogoutConfig,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Server context gateway configuration.
///
/// ## Fields
/// - `base_url`: Base URL of the POS backend (default: "http://localhost:8000")
/// - `timeout_seconds`: Request timeout (default: 10, range: 1-120)
/// - `context_path`: `GetOperationalContext` endpoint
/// - `select_path`: `SetOperationalContext` endpoint
/// - `secondary_resource_path`: `GetSecondaryResourceStatus` endpoint (the
///   current opening)
/// - `api_token`: Optional bearer token
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_gateway_timeout")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_seconds: u64,

    #[serde(default = "default_context_path")]
    #[validate(length(min = 1, max = 255))]
    pub context_path: String,

    #[serde(default = "default_select_path")]
    #[validate(length(min = 1, max = 255))]
    pub select_path: String,

    #[serde(default = "default_secondary_resource_path")]
    #[validate(length(min = 1, max = 255))]
    pub secondary_resource_path: String,

    #[serde(default)]
    pub api_token: Option<String>,
}

pub(crate) fn default_gateway_base_url() -> String {
    "http://localhost:8000".to_string()
}

pub(crate) fn default_gateway_timeout() -> u64 {
    10
}

pub(crate) fn default_context_path() -> String {
    "/api/operational-context".to_string()
}

pub(crate) fn default_select_path() -> String {
    "/api/operational-context/select".to_string()
}

pub(crate) fn default_secondary_resource_path() -> String {
    "/api/opening/current".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            timeout_seconds: default_gateway_timeout(),
            context_path: default_context_path(),
            select_path: default_select_path(),
            secondary_resource_path: default_secondary_resource_path(),
            api_token: None,
        }
    }
}

/// Client-side cache configuration.
///
/// ## Fields
/// - `namespace`: Prefix applied to every cache key (default: "pos:")
/// - `context_ttl_seconds`: Lifetime of the cached context (default: 28800,
///   `None` never expires)
/// - `storage_dir`: Directory for file-backed storage (default: platform data
///   dir)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_namespace")]
    #[validate(length(min = 1, max = 64))]
    pub namespace: String,

    #[serde(default = "default_context_ttl")]
    #[validate(range(min = 1))]
    pub context_ttl_seconds: Option<u64>,

    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

pub(crate) fn default_cache_namespace() -> String {
    "pos:".to_string()
}

pub(crate) fn default_context_ttl() -> Option<u64> {
    Some(8 * 60 * 60)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_cache_namespace(),
            context_ttl_seconds: default_context_ttl(),
            storage_dir: None,
        }
    }
}

/// Fixed-delay retry bound.
///
/// `max_attempts` counts every invocation, the first one included.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate, PartialEq, Eq)]
#[validate(schema(function = "validate_retry_budget"))]
pub struct RetryConfig {
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    #[validate(range(min = 0, max = 5000))]
    pub delay_ms: u64,
}

fn validate_retry_budget(retry: &RetryConfig) -> Result<(), validator::ValidationError> {
    let budget = u64::from(retry.max_attempts.saturating_sub(1)) * retry.delay_ms;
    if budget > MAX_RETRY_BUDGET_MS {
        return Err(validator::ValidationError::new("retry budget exceeds 5 seconds"));
    }
    Ok(())
}

/// Access guard configuration.
///
/// ## Fields
/// - `selection_retry`: Bound for "selection required" re-checks (default: 3
///   attempts, 300ms)
/// - `transient_retry`: Bound for network/server failures (default: 3
///   attempts, 500ms)
/// - `selection_route`: Route of the profile selection screen
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct GuardConfig {
    #[serde(default = "default_selection_retry")]
    #[validate(nested)]
    pub selection_retry: RetryConfig,

    #[serde(default = "default_transient_retry")]
    #[validate(nested)]
    pub transient_retry: RetryConfig,

    #[serde(default = "default_selection_route")]
    #[validate(length(min = 1, max = 255))]
    pub selection_route: String,
}

pub(crate) fn default_selection_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        delay_ms: 300,
    }
}

pub(crate) fn default_transient_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        delay_ms: 500,
    }
}

pub(crate) fn default_selection_route() -> String {
    "/select-profile".to_string()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            selection_retry: default_selection_retry(),
            transient_retry: default_transient_retry(),
            selection_route: default_selection_route(),
        }
    }
}

/// Cross-tab broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct BroadcastConfig {
    /// Topic name of the explicit broadcast channel
    #[serde(default = "default_broadcast_topic")]
    #[validate(length(min = 1, max = 128))]
    pub topic: String,

    /// Listen for storage change notifications
    #[serde(default = "default_true")]
    pub storage_events: bool,

    /// Use the explicit broadcast channel
    #[serde(default = "default_true")]
    pub broadcast_channel: bool,
}

pub(crate) fn default_broadcast_topic() -> String {
    "pos-operational-context".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            topic: default_broadcast_topic(),
            storage_events: true,
            broadcast_channel: true,
        }
    }
}

/// Logout behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogoutConfig {
    /// Storage keys kept when everything else is purged on logout
    #[serde(default = "default_preserved_keys")]
    pub preserved_keys: Vec<String>,
}

pub(crate) fn default_preserved_keys() -> Vec<String> {
    vec!["pos:debug".to_string(), "pos:diagnostics".to_string()]
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            preserved_keys: default_preserved_keys(),
        }
    }
}

/// Observability configuration.
///
/// ## Fields
/// - `log_level`: trace/debug/info/warn/error (default: "info")
/// - `json_logs`: Emit JSON formatted logs (default: false)
/// - `metrics_enabled`: Record resolution metrics (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}

fn validate_log_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid log level")),
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}
