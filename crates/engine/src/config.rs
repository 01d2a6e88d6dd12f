//! Preview engine configuration
//!
//! A single explicit value handed to the resolver, dispatcher and renderers
//! at construction. Configuration can be loaded from a TOML file, environment
//! variables, or built programmatically.

use docket_preview_core::VirtualizerConfig;
use docket_preview_scheduler::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_MAX_ATTEMPTS: &str = "DOCKET_PREVIEW_MAX_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "DOCKET_PREVIEW_RETRY_DELAY_MS";
pub const ENV_TIMEOUT_MS: &str = "DOCKET_PREVIEW_TIMEOUT_MS";
pub const ENV_URL_TTL_SECS: &str = "DOCKET_PREVIEW_URL_TTL_SECS";
pub const ENV_VIEWPORT_MARGIN_PX: &str = "DOCKET_PREVIEW_VIEWPORT_MARGIN_PX";
pub const ENV_BUFFER_ITEMS: &str = "DOCKET_PREVIEW_BUFFER_ITEMS";
pub const ENV_CONTROLS_HIDE_MS: &str = "DOCKET_PREVIEW_CONTROLS_HIDE_MS";
pub const ENV_HANDLE_BUDGET_MB: &str = "DOCKET_PREVIEW_HANDLE_BUDGET_MB";
pub const ENV_DOCUMENT_ENGINE_URL: &str = "DOCKET_PREVIEW_DOCUMENT_ENGINE_URL";

/// Largest accepted handle budget (1 TiB)
pub const MAX_HANDLE_BUDGET_MB: usize = 1024 * 1024;

/// Configuration for one preview engine instance
///
/// Missing keys in a file take their defaults; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Resolution attempts including the first
    pub max_attempts: u32,
    /// Fixed delay between resolution attempts
    pub retry_delay_ms: u64,
    /// Upper bound on a single backend call
    pub request_timeout_ms: u64,
    /// Lifetime requested for signed URLs
    pub signed_url_ttl_secs: u64,
    /// Near-visible margin around the scroll container
    pub viewport_margin_px: f32,
    /// Items materialized on each side of the near-visible range
    pub buffer_items: usize,
    /// Pointer inactivity before video controls hide
    pub controls_hide_ms: u64,
    /// Memory budget for locally held file bytes
    pub handle_budget_mb: usize,
    /// Endpoint of the external document rendering engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_engine_url: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 30_000,
            signed_url_ttl_secs: 3600,
            viewport_margin_px: 200.0,
            buffer_items: 2,
            controls_hide_ms: 3000,
            handle_budget_mb: 512,
            document_engine_url: None,
        }
    }
}

impl PreviewConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_signed_url_ttl_secs(mut self, secs: u64) -> Self {
        self.signed_url_ttl_secs = secs;
        self
    }

    pub fn with_viewport_margin_px(mut self, px: f32) -> Self {
        self.viewport_margin_px = px;
        self
    }

    pub fn with_buffer_items(mut self, items: usize) -> Self {
        self.buffer_items = items;
        self
    }

    pub fn with_controls_hide_ms(mut self, ms: u64) -> Self {
        self.controls_hide_ms = ms;
        self
    }

    pub fn with_handle_budget_mb(mut self, mb: usize) -> Self {
        self.handle_budget_mb = mb;
        self
    }

    pub fn with_document_engine_url(mut self, url: impl Into<String>) -> Self {
        self.document_engine_url = Some(url.into());
        self
    }

    /// Returns the default config file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/docket-preview/preview.toml
    /// - Linux: ~/.config/docket-preview/preview.toml
    /// - Windows: %APPDATA%\docket-preview\preview.toml
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("docket-preview").join("preview.toml"),
            None => PathBuf::from("preview.toml"),
        }
    }

    /// Loads configuration from environment variables over the defaults.
    ///
    /// # Errors
    /// Returns an error if any variable holds an unparsable or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overrides fields from any `DOCKET_PREVIEW_*` variables that are set.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_value(ENV_MAX_ATTEMPTS)? {
            self.max_attempts = value;
        }
        if let Some(value) = env_value(ENV_RETRY_DELAY_MS)? {
            self.retry_delay_ms = value;
        }
        if let Some(value) = env_value(ENV_TIMEOUT_MS)? {
            self.request_timeout_ms = value;
        }
        if let Some(value) = env_value(ENV_URL_TTL_SECS)? {
            self.signed_url_ttl_secs = value;
        }
        if let Some(value) = env_value(ENV_VIEWPORT_MARGIN_PX)? {
            self.viewport_margin_px = value;
        }
        if let Some(value) = env_value(ENV_BUFFER_ITEMS)? {
            self.buffer_items = value;
        }
        if let Some(value) = env_value(ENV_CONTROLS_HIDE_MS)? {
            self.controls_hide_ms = value;
        }
        if let Some(value) = env_value(ENV_HANDLE_BUDGET_MB)? {
            self.handle_budget_mb = value;
        }
        if let Ok(url) = std::env::var(ENV_DOCUMENT_ENGINE_URL) {
            self.document_engine_url = Some(url).filter(|url| !url.trim().is_empty());
        }

        self.validate()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// max_attempts = 3
    /// retry_delay_ms = 1000
    /// viewport_margin_px = 200.0
    /// document_engine_url = "https://render.internal/engine.js"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Loads the default file if present, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Loads `path` if it exists (defaults otherwise), then applies
    /// environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let base = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        base.apply_env()
    }

    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string(self)?;
        Ok(format!("# Docket Preview configuration\n{body}"))
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("max_attempts".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("request_timeout_ms".to_string()));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("signed_url_ttl_secs".to_string()));
        }
        if !self.viewport_margin_px.is_finite() || self.viewport_margin_px < 0.0 {
            return Err(ConfigError::InvalidValue("viewport_margin_px".to_string()));
        }
        if self.handle_budget_mb == 0 || self.handle_budget_mb > MAX_HANDLE_BUDGET_MB {
            return Err(ConfigError::InvalidValue("handle_budget_mb".to_string()));
        }
        Ok(self)
    }

    /// Shared retry policy for every resolution call site
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
            .with_timeout(self.request_timeout())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn controls_hide_after(&self) -> Duration {
        Duration::from_millis(self.controls_hide_ms)
    }

    pub fn virtualizer(&self) -> VirtualizerConfig {
        VirtualizerConfig::default()
            .with_margin(self.viewport_margin_px)
            .with_buffer(self.buffer_items)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
