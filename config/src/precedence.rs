//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::config::{
    BroadcastConfig, CacheConfig, GatewayConfig, GuardConfig, LogoutConfig, ObservabilityConfig,
    PosConfig,
};
use std::fmt::Debug;

/// Merge multiple configuration sources with precedence.
///
/// A field from a higher-precedence source only wins when it differs from
/// the built-in default, so a source that leaves a field untouched never
/// resets a value set by a lower-precedence source.
///
/// ## Usage
/// ```rust,no_run
/// use config::{PosConfig, load_from_env, load_from_file, merge_configs};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = merge_configs(
///         PosConfig::default(),
///         load_from_file(Path::new("pos.toml"))?,
///         "file",
///         load_from_env()?,
///         "env",
///         None,
///         "cli",
///     );
///     println!("{}", config.gateway.base_url);
///     Ok(())
/// }
/// ```
pub fn merge_configs(
    defaults: PosConfig,
    file_config: PosConfig,
    file_source_name: &str,
    env_config: PosConfig,
    env_source_name: &str,
    cli_config: Option<PosConfig>,
    cli_source_name: &str,
) -> PosConfig {
    let mut config = defaults;

    config = merge_with_logging(config, file_config, file_source_name);
    config = merge_with_logging(config, env_config, env_source_name);

    if let Some(cli) = cli_config {
        config = merge_with_logging(config, cli, cli_source_name);
    }

    config
}

fn merge_with_logging(
    mut base: PosConfig,
    override_config: PosConfig,
    source_name: &str,
) -> PosConfig {
    let mut changes = Vec::new();

    merge_gateway(&mut base.gateway, &override_config.gateway, &mut changes);
    merge_cache(&mut base.cache, &override_config.cache, &mut changes);
    merge_guard(&mut base.guard, &override_config.guard, &mut changes);
    merge_broadcast(&mut base.broadcast, &override_config.broadcast, &mut changes);
    merge_logout(&mut base.logout, &override_config.logout, &mut changes);
    merge_observability(
        &mut base.observability,
        &override_config.observability,
        &mut changes,
    );

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

fn merge_field<T: PartialEq + Clone + Debug>(
    name: &str,
    base: &mut T,
    override_value: &T,
    default_value: &T,
    changes: &mut Vec<String>,
) {
    if override_value != default_value && *override_value != *base {
        changes.push(format!("{name} = {override_value:?}"));
        base.clone_from(override_value);
    }
}

fn merge_gateway(base: &mut GatewayConfig, over: &GatewayConfig, changes: &mut Vec<String>) {
    let defaults = GatewayConfig::default();
    merge_field(
        "gateway.base_url",
        &mut base.base_url,
        &over.base_url,
        &defaults.base_url,
        changes,
    );
    merge_field(
        "gateway.timeout_seconds",
        &mut base.timeout_seconds,
        &over.timeout_seconds,
        &defaults.timeout_seconds,
        changes,
    );
    merge_field(
        "gateway.context_path",
        &mut base.context_path,
        &over.context_path,
        &defaults.context_path,
        changes,
    );
    merge_field(
        "gateway.select_path",
        &mut base.select_path,
        &over.select_path,
        &defaults.select_path,
        changes,
    );
    merge_field(
        "gateway.secondary_resource_path",
        &mut base.secondary_resource_path,
        &over.secondary_resource_path,
        &defaults.secondary_resource_path,
        changes,
    );
    if over.api_token.is_some() && over.api_token != base.api_token {
        changes.push("gateway.api_token = ***".to_string());
        base.api_token.clone_from(&over.api_token);
    }
}

fn merge_cache(base: &mut CacheConfig, over: &CacheConfig, changes: &mut Vec<String>) {
    let defaults = CacheConfig::default();
    merge_field(
        "cache.namespace",
        &mut base.namespace,
        &over.namespace,
        &defaults.namespace,
        changes,
    );
    merge_field(
        "cache.context_ttl_seconds",
        &mut base.context_ttl_seconds,
        &over.context_ttl_seconds,
        &defaults.context_ttl_seconds,
        changes,
    );
    merge_field(
        "cache.storage_dir",
        &mut base.storage_dir,
        &over.storage_dir,
        &defaults.storage_dir,
        changes,
    );
}

fn merge_guard(base: &mut GuardConfig, over: &GuardConfig, changes: &mut Vec<String>) {
    let defaults = GuardConfig::default();
    merge_field(
        "guard.selection_retry",
        &mut base.selection_retry,
        &over.selection_retry,
        &defaults.selection_retry,
        changes,
    );
    merge_field(
        "guard.transient_retry",
        &mut base.transient_retry,
        &over.transient_retry,
        &defaults.transient_retry,
        changes,
    );
    merge_field(
        "guard.selection_route",
        &mut base.selection_route,
        &over.selection_route,
        &defaults.selection_route,
        changes,
    );
}

fn merge_broadcast(base: &mut BroadcastConfig, over: &BroadcastConfig, changes: &mut Vec<String>) {
    let defaults = BroadcastConfig::default();
    merge_field("broadcast.topic", &mut base.topic, &over.topic, &defaults.topic, changes);
    merge_field(
        "broadcast.storage_events",
        &mut base.storage_events,
        &over.storage_events,
        &defaults.storage_events,
        changes,
    );
    merge_field(
        "broadcast.broadcast_channel",
        &mut base.broadcast_channel,
        &over.broadcast_channel,
        &defaults.broadcast_channel,
        changes,
    );
}

fn merge_logout(base: &mut LogoutConfig, over: &LogoutConfig, changes: &mut Vec<String>) {
    let defaults = LogoutConfig::default();
    merge_field(
        "logout.preserved_keys",
        &mut base.preserved_keys,
        &over.preserved_keys,
        &defaults.preserved_keys,
        changes,
    );
}

fn merge_observability(
    base: &mut ObservabilityConfig,
    over: &ObservabilityConfig,
    changes: &mut Vec<String>,
) {
    let defaults = ObservabilityConfig::default();
    merge_field(
        "observability.log_level",
        &mut base.log_level,
        &over.log_level,
        &defaults.log_level,
        changes,
    );
    merge_field(
        "observability.json_logs",
        &mut base.json_logs,
        &over.json_logs,
        &defaults.json_logs,
        changes,
    );
    merge_field(
        "observability.metrics_enabled",
        &mut base.metrics_enabled,
        &over.metrics_enabled,
        &defaults.metrics_enabled,
        changes,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    #[test]
    fn test_env_overrides_file() {
        let mut file = PosConfig::default();
        file.gateway.base_url = "https://file.example.com".to_string();
        file.cache.namespace = "file:".to_string();

        let mut env = PosConfig::default();
        env.gateway.base_url = "https://env.example.com".to_string();

        let merged = merge_configs(PosConfig::default(), file, "file", env, "env", None, "cli");

        assert_eq!(merged.gateway.base_url, "https://env.example.com");
        assert_eq!(merged.cache.namespace, "file:");
    }

    #[test]
    fn test_cli_overrides_everything() {
        let mut env = PosConfig::default();
        env.observability.log_level = "warn".to_string();

        let mut cli = PosConfig::default();
        cli.observability.log_level = "trace".to_string();
        cli.guard.selection_retry = RetryConfig {
            max_attempts: 1,
            delay_ms: 0,
        };

        let merged = merge_configs(
            PosConfig::default(),
            PosConfig::default(),
            "file",
            env,
            "env",
            Some(cli),
            "cli",
        );

        assert_eq!(merged.observability.log_level, "trace");
        assert_eq!(merged.guard.selection_retry.max_attempts, 1);
    }

    #[test]
    fn test_default_valued_source_does_not_reset() {
        let mut file = PosConfig::default();
        file.broadcast.storage_events = false;

        let merged = merge_configs(
            PosConfig::default(),
            file,
            "file",
            PosConfig::default(),
            "env",
            None,
            "cli",
        );

        assert!(!merged.broadcast.storage_events);
    }

    #[test]
    fn test_api_token_is_merged() {
        let mut env = PosConfig::default();
        env.gateway.api_token = Some("token".to_string());

        let merged = merge_configs(
            PosConfig::default(),
            PosConfig::default(),
            "file",
            env,
            "env",
            None,
            "cli",
        );

        assert_eq!(merged.gateway.api_token.as_deref(), Some("token"));
    }
}
