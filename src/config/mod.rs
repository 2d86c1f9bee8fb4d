//! Configuration management for the gateway
//!
//! Handles configuration loading, defaults, and validation.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::module::scheduler::IntervalPolicy;

/// Module source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSourceConfig {
    /// Path of the module's binary image on the origin
    #[serde(default = "default_source_path")]
    pub source_path: String,

    /// Timeout for fetching the module image, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_source_path() -> String {
    "/app.wasm".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for ModuleSourceConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Interception eligibility configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// Path prefix for static assets, never intercepted
    #[serde(default = "default_assets_prefix")]
    pub assets_prefix: String,

    /// Exact paths that always pass through to the origin
    #[serde(default = "default_bypass_paths")]
    pub bypass_paths: Vec<String>,
}

fn default_assets_prefix() -> String {
    "/assets/".to_string()
}

fn default_bypass_paths() -> Vec<String> {
    vec!["/sw.js".to_string()]
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            assets_prefix: default_assets_prefix(),
            bypass_paths: default_bypass_paths(),
        }
    }
}

/// Revalidation cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidationConfig {
    /// Minimum seconds between periodic module checks
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Maximum seconds between periodic module checks
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,

    /// Skew exponent of the interval distribution
    #[serde(default = "default_skew")]
    pub skew: f64,

    /// Truncation width of the interval distribution, in standard
    /// deviations
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_min_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_interval_secs() -> u64 {
    900 // 15 minutes
}

fn default_skew() -> f64 {
    1.0
}

fn default_sigma() -> f64 {
    4.0
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            skew: default_skew(),
            sigma: default_sigma(),
        }
    }
}

impl RevalidationConfig {
    /// Convert to the scheduler's interval policy.
    pub fn interval_policy(&self) -> IntervalPolicy {
        IntervalPolicy {
            min: Duration::from_secs(self.min_interval_secs),
            max: Duration::from_secs(self.max_interval_secs),
            skew: self.skew,
            sigma: self.sigma,
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Address the gateway listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<SocketAddr>,

    /// Base URL of the fronted origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Module source configuration
    #[serde(default)]
    pub module: ModuleSourceConfig,

    /// Interception eligibility configuration
    #[serde(default)]
    pub intercept: InterceptConfig,

    /// Revalidation cadence configuration
    #[serde(default)]
    pub revalidation: RevalidationConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.revalidation.min_interval_secs > self.revalidation.max_interval_secs {
            anyhow::bail!(
                "revalidation.min_interval_secs ({}) exceeds max_interval_secs ({})",
                self.revalidation.min_interval_secs,
                self.revalidation.max_interval_secs
            );
        }
        if self.revalidation.sigma <= 0.0 {
            anyhow::bail!("revalidation.sigma must be positive");
        }
        if self.revalidation.skew <= 0.0 {
            anyhow::bail!("revalidation.skew must be positive");
        }
        if !self.intercept.assets_prefix.starts_with('/') {
            anyhow::bail!("intercept.assets_prefix must start with '/'");
        }
        if !self.module.source_path.starts_with('/') {
            anyhow::bail!("module.source_path must start with '/'");
        }
        Ok(())
    }
}
