use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::MatchingConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Scraping proxy connection, retry and rate-limit settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub endpoint: String,
    pub api_key: String,
    pub search_rpm: u32,
    pub detail_rpm: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.zyte.com/v1/extract".to_string(),
            api_key: String::new(),
            search_rpm: 250,
            detail_rpm: 250,
            max_retries: 3,
            retry_backoff_ms: 2000,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    pub origin: String,
    pub search_limit: usize,
    pub detail_cache_size: u64,
    pub detail_cache_ttl_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: "https://rceapi.estado.pr.gov/api".to_string(),
            origin: "https://rcp.estado.pr.gov".to_string(),
            search_limit: 250,
            detail_cache_size: 1000,
            detail_cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
            requests_per_minute: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    #[serde(default = "default_postal_code_bonus")]
    pub postal_code_bonus: f64,
    #[serde(default = "default_city_bonus")]
    pub city_bonus: f64,
    #[serde(default = "default_prefilter_size")]
    pub prefilter_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            postal_code_bonus: default_postal_code_bonus(),
            city_bonus: default_city_bonus(),
            prefilter_size: default_prefilter_size(),
            top_k: default_top_k(),
        }
    }
}

fn default_accept_threshold() -> f64 { 85.0 }
fn default_high_threshold() -> f64 { 95.0 }
fn default_medium_threshold() -> f64 { 80.0 }
fn default_postal_code_bonus() -> f64 { 10.0 }
fn default_city_bonus() -> f64 { 5.0 }
fn default_prefilter_size() -> usize { 10 }
fn default_top_k() -> usize { 3 }

impl From<&MatchingSettings> for MatchingConfig {
    fn from(s: &MatchingSettings) -> Self {
        Self {
            accept_threshold: s.accept_threshold,
            high_threshold: s.high_threshold,
            medium_threshold: s.medium_threshold,
            postal_code_bonus: s.postal_code_bonus,
            city_bonus: s.city_bonus,
            prefilter_size: s.prefilter_size.max(1),
            top_k: s.top_k.max(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { concurrency: default_concurrency() }
    }
}

fn default_concurrency() -> usize { 8 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with REGMATCH_)
    /// 5. Credential variables ZYTE_API_KEY and OPENAI_API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., REGMATCH__GATEWAY__SEARCH_RPM -> gateway.search_rpm
            .add_source(
                Environment::with_prefix("REGMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = apply_credential_env(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("REGMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_credential_env(settings)?.try_deserialize()
    }

    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig::from(&self.matching)
    }
}

/// Override API keys from the conventional credential variables
fn apply_credential_env(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(key) = env::var("ZYTE_API_KEY") {
        builder = builder.set_override("gateway.api_key", key)?;
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        builder = builder.set_override("assistant.api_key", key)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matching() {
        let config = MatchingSettings::default();
        assert_eq!(config.accept_threshold, 85.0);
        assert_eq!(config.high_threshold, 95.0);
        assert_eq!(config.medium_threshold, 80.0);
        assert_eq!(config.postal_code_bonus, 10.0);
        assert_eq!(config.city_bonus, 5.0);
        assert_eq!(MatchingConfig::from(&config), MatchingConfig::default());
    }

    #[test]
    fn test_default_gateway() {
        let gateway = GatewaySettings::default();
        assert_eq!(gateway.max_retries, 3);
        assert_eq!(gateway.retry_backoff_ms, 2000);
        assert_eq!(gateway.search_rpm, 250);
        assert_eq!(gateway.detail_rpm, 250);
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "compact");
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("registry-match-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            "[matching]\naccept_threshold = 90.0\n\n[gateway]\nmax_retries = 5\n\n[batch]\nconcurrency = 2\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.matching.accept_threshold, 90.0);
        assert_eq!(settings.matching.city_bonus, 5.0);
        assert_eq!(settings.gateway.max_retries, 5);
        assert_eq!(settings.gateway.search_rpm, 250);
        assert_eq!(settings.batch.concurrency, 2);
        assert_eq!(settings.logging.level, "info");

        std::fs::remove_dir_all(&dir).ok();
    }
}
