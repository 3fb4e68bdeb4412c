//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.huginn/secrets.toml` (user, must be 0600)
//! 2. `/etc/huginn/secrets.toml` (system, must be 0600)
//!
//! API keys missing from the secrets file fall back to `GROQ_API_KEY` and
//! `GEMINI_API_KEY`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheConfig, SignatureMode};
use crate::gateway::{Huginn, HuginnBuilder};
use crate::rate_limit::RateLimitConfig;
use crate::router::{DEFAULT_LARGE_CONTEXT_THRESHOLD, DEFAULT_REQUEST_TIMEOUT};
use crate::{HuginnError, Result};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Provider configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub groq: Option<ApiProviderConfig>,
    #[serde(default)]
    pub gemini: Option<ApiProviderConfig>,
}

/// API provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProviderConfig {
    /// Model to use instead of the client default.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (proxies, testing).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Request limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Per-call provider timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Text length above which the large-context provider goes first.
    #[serde(default = "default_large_context")]
    pub large_context_threshold_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            large_context_threshold_chars: default_large_context(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_large_context() -> usize {
    DEFAULT_LARGE_CONTEXT_THRESHOLD
}

/// Token bucket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Bucket capacity (default: 20).
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Seconds to regain one token (default: 10).
    #[serde(default = "default_refill_secs")]
    pub refill_interval_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_secs: default_refill_secs(),
        }
    }
}

fn default_capacity() -> u32 {
    20
}

fn default_refill_secs() -> u64 {
    10
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Entry lifetime in seconds (default: 24h).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Entry count that triggers a sweep (default: 150).
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// `sampled` (default) or `full_digest`.
    #[serde(default)]
    pub signature: SignatureMode,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            high_water_mark: default_high_water_mark(),
            signature: SignatureMode::default(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_high_water_mark() -> usize {
    150
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Store file (default: platform data dir, see [`FileStore`](crate::FileStore)).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub groq: Option<ApiKeySecret>,
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[("groq", "GROQ_API_KEY"), ("gemini", "GEMINI_API_KEY")];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from(&path)
    }

    /// Like [`load`](Self::load), but fall back to defaults when no file
    /// exists in the standard locations. An explicit path must exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path) {
            Ok(path) => Self::load_from(&path),
            Err(_) if explicit_path.is_none() => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Parse a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .capacity(self.rate_limit.capacity)
            .refill_interval(Duration::from_secs(self.rate_limit.refill_interval_secs))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .high_water_mark(self.cache.high_water_mark)
            .signature(self.cache.signature)
    }

    /// A gateway builder populated from this config and `secrets`.
    ///
    /// The store is left to the caller, since opening it is async.
    pub fn builder(&self, secrets: &Secrets) -> HuginnBuilder {
        let mut builder = Huginn::builder()
            .rate_limit(self.rate_limit_config())
            .cache(self.cache_config())
            .request_timeout(Duration::from_secs(self.limits.request_timeout_secs))
            .large_context_threshold(self.limits.large_context_threshold_chars);

        if let Some(key) = secrets.api_key("groq") {
            builder = builder.groq(key);
        }
        if let Some(groq) = &self.providers.groq {
            if let Some(model) = &groq.model {
                builder = builder.groq_model(model);
            }
            if let Some(url) = &groq.base_url {
                builder = builder.groq_base_url(url);
            }
        }

        if let Some(key) = secrets.api_key("gemini") {
            builder = builder.gemini(key);
        }
        if let Some(gemini) = &self.providers.gemini {
            if let Some(model) = &gemini.model {
                builder = builder.gemini_model(model);
            }
            if let Some(url) = &gemini.base_url {
                builder = builder.gemini_base_url(url);
            }
        }
        builder
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.huginn/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/huginn/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        // Try user secrets first
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".huginn").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from(&user_secrets);
            }
        }

        // Try system secrets
        let system_secrets = PathBuf::from("/etc/huginn/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from(&system_secrets);
        }

        // No secrets file — return empty (providers can fall back to env vars)
        Ok(Secrets::default())
    }

    /// Load a specific secrets file after checking its permissions.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Get API key for a provider, falling back to the corresponding environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "groq" => self.groq.as_ref(),
            "gemini" => self.gemini.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone())
        .filter(|k| !k.trim().is_empty());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|k| !k.trim().is_empty())
        })
    }
}
