//! Fabric configuration (spec ambient stack, SPEC_FULL §4.7)
//!
//! Layered `config`-crate loading (bundled defaults → optional file →
//! `FABRIC_`-prefixed environment variables) plus `development()`/
//! `production()` presets, following the teacher's
//! `message_router::config::RouterConfig` pattern.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for one fabric process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Default wall-clock timeout for an RPC call, milliseconds.
    pub rpc_timeout_ms: u64,
    /// Liveliness lease duration, milliseconds.
    pub liveliness_lease_ms: u64,
    /// How many distinct late-joiner samples a durable topic retains per key.
    pub replay_buffer_size: usize,
    /// Default `min_score` passed to `Matcher::select` when unspecified.
    pub matcher_min_score: f64,
    /// Whether to start the admin/observability HTTP surface.
    pub admin_enabled: bool,
    /// Bind address for the admin surface, if enabled.
    pub admin_bind_address: String,
    /// `tracing-subscriber` `EnvFilter` directive string.
    pub log_filter: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            liveliness_lease_ms: 5_000,
            replay_buffer_size: 1,
            matcher_min_score: 0.4,
            admin_enabled: false,
            admin_bind_address: "127.0.0.1:8089".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl FabricConfig {
    /// Loads configuration from the bundled defaults, an optional file at
    /// `path`, and `FABRIC_`-prefixed environment variables, in that
    /// precedence order (later sources win).
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = ::config::Config::builder().add_source(
            ::config::Config::try_from(&defaults).map_err(ConfigError::Load)?,
        );

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        builder = builder.add_source(::config::Environment::with_prefix("FABRIC"));

        let config = builder.build().map_err(ConfigError::Load)?;
        config.try_deserialize().map_err(ConfigError::Load)
    }

    /// A preset tuned for local development: short timeouts and leases so
    /// tests and manual runs fail fast, admin surface enabled.
    #[must_use]
    pub fn development() -> Self {
        Self {
            rpc_timeout_ms: 2_000,
            liveliness_lease_ms: 1_000,
            replay_buffer_size: 4,
            matcher_min_score: 0.3,
            admin_enabled: true,
            admin_bind_address: "127.0.0.1:8089".to_string(),
            log_filter: "debug".to_string(),
        }
    }

    /// A preset tuned for production: conservative timeouts and leases,
    /// admin surface off by default.
    #[must_use]
    pub fn production() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            liveliness_lease_ms: 5_000,
            replay_buffer_size: 1,
            matcher_min_score: 0.4,
            admin_enabled: false,
            admin_bind_address: "0.0.0.0:8089".to_string(),
            log_filter: "info".to_string(),
        }
    }

    /// This process's default RPC call timeout.
    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// This process's liveliness lease duration.
    #[must_use]
    pub fn liveliness_lease(&self) -> Duration {
        Duration::from_millis(self.liveliness_lease_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_preset_enables_admin_surface() {
        assert!(FabricConfig::development().admin_enabled);
    }

    #[test]
    fn production_preset_disables_admin_surface() {
        assert!(!FabricConfig::production().admin_enabled);
    }

    #[test]
    fn default_rpc_timeout_matches_spec_example() {
        assert_eq!(FabricConfig::default().rpc_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn load_without_a_file_falls_back_to_defaults() {
        let loaded = FabricConfig::load(None).unwrap();
        assert_eq!(loaded.rpc_timeout_ms, FabricConfig::default().rpc_timeout_ms);
    }

    #[test]
    fn load_reads_an_override_from_a_toml_file() {
        let mut overrides = FabricConfig::default();
        overrides.rpc_timeout_ms = 42;
        overrides.admin_enabled = true;
        let document = toml::to_string(&overrides).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("fabric.toml");
        std::fs::write(&file_path, document).unwrap();

        let loaded = FabricConfig::load(Some(file_path.with_extension("").to_str().unwrap())).unwrap();

        assert_eq!(loaded.rpc_timeout_ms, 42);
        assert!(loaded.admin_enabled);
        assert_eq!(loaded.liveliness_lease_ms, FabricConfig::default().liveliness_lease_ms);
    }
}
