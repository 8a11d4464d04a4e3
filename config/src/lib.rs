//! # Configuration System
//!
//! Centralized configuration management for a POS terminal session.
//!
//! This crate provides:
//! - Configuration structures for the gateway, cache, guard, broadcast and
//!   logging
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validation;

pub use config::{
    BroadcastConfig, CacheConfig, GatewayConfig, GuardConfig, LogoutConfig, ObservabilityConfig,
    PosConfig, RetryConfig,
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validation::validate;
pub use ::validator::Validate;
