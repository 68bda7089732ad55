//! Typed configuration.
//!
//! [`Config`] is the process-level config read from environment variables.
//! [`EngineConfig`] holds the loading engine's timing and message settings;
//! it comes from defaults, an optional TOML file, and `LOADING_*` overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::messages::{DEFAULT_MESSAGE, MessageCatalog};

pub const DEFAULT_REVEAL_DELAY_MS: u64 = 150;
pub const DEFAULT_RAPID_RESUME_WINDOW_MS: u64 = 800;
pub const DEFAULT_SHORT_VARIANT_THRESHOLD_MS: u64 = 850;

#[derive(Debug)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Optional TOML file with an [`EngineConfig`].
    pub engine_config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            engine_config_path: optional_var("LOADING_CONFIG").map(PathBuf::from),
        })
    }

    /// Build the engine config: file (if any) first, then `LOADING_*` env vars.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let base = match &self.engine_config_path {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        base.with_env()
    }
}

/// Loading engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How long a fresh busy episode waits before the indicator shows.
    pub reveal_delay_ms: u64,
    /// A new episode starting this soon after the last one settled shows at once.
    pub rapid_resume_window_ms: u64,
    /// How long after reveal the lighter "short" variant stays in use.
    pub short_variant_threshold_ms: u64,
    pub default_message: String,
    /// Per-scope message overrides, e.g. `[messages.action] save_route = "..."`.
    pub messages: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_delay_ms: DEFAULT_REVEAL_DELAY_MS,
            rapid_resume_window_ms: DEFAULT_RAPID_RESUME_WINDOW_MS,
            short_variant_threshold_ms: DEFAULT_SHORT_VARIANT_THRESHOLD_MS,
            default_message: DEFAULT_MESSAGE.to_string(),
            messages: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read engine config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad engine config {}: {e}", path.display())))
    }

    /// Defaults overlaid with `LOADING_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Overlay `LOADING_*` environment variables.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(ms) = parse_ms(&var, "LOADING_REVEAL_DELAY_MS")? {
            self.reveal_delay_ms = ms;
        }
        if let Some(ms) = parse_ms(&var, "LOADING_RAPID_RESUME_WINDOW_MS")? {
            self.rapid_resume_window_ms = ms;
        }
        if let Some(ms) = parse_ms(&var, "LOADING_SHORT_VARIANT_THRESHOLD_MS")? {
            self.short_variant_threshold_ms = ms;
        }
        if let Some(message) = var("LOADING_DEFAULT_MESSAGE") {
            self.default_message = message;
        }
        self.validate()?;
        Ok(self)
    }

    /// Fail fast on settings the engine cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.default_message.trim().is_empty() {
            return Err(Error::Config("default_message must not be empty".to_string()));
        }
        self.catalog().map(|_| ())
    }

    /// The message catalog with this config's overrides applied.
    pub fn catalog(&self) -> Result<MessageCatalog> {
        MessageCatalog::builtin(self.default_message.clone()).with_overrides(&self.messages)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot render engine config: {e}")))
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_ms(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{name} must be a whole number of milliseconds: {e}"))
            })
        })
        .transpose()
}
