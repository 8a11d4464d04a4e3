//! # Configuration Validation
//!
//! Validation for all configuration structures using the `validator` crate.

use crate::config::PosConfig;
use validator::Validate;

/// Validate a configuration structure, nested sections included.
///
/// ## Validation Rules
/// - `gateway.base_url`: a parseable URL
/// - `gateway.timeout_seconds`: 1-120
/// - `cache.namespace`: 1-64 characters
/// - `cache.context_ttl_seconds`: at least 1 when set
/// - `guard.*_retry.max_attempts`: 1-10, total sleep at most 5 seconds
/// - `observability.log_level`: trace/debug/info/warn/error
pub fn validate(config: &PosConfig) -> Result<(), validator::ValidationErrors> {
    config.validate()
}
