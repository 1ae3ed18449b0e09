//! Application configuration management
//!
//! Configuration is assembled from three layers: an optional `.env` file, an
//! optional TOML file (`CONFIG_PATH`, default `config.toml`) and process
//! environment variables, which win over the TOML values. The result is
//! validated once at startup so a misconfigured bridge fails fast.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::constants::gemini::{COOKIE_PSID, COOKIE_PSIDCC, COOKIE_PSIDTS};

/// Default server port
const DEFAULT_PORT: u16 = 3000;

/// Default cookie rotation interval in minutes
const DEFAULT_REFRESH_INTERVAL: i64 = 5;

/// Default upper bound for one backend generate call, in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 300;

const DEFAULT_PROVIDER: &str = "gemini";

const DEFAULT_COOKIE_CACHE_DIR: &str = ".cookies";

/// Errors raised while reading the environment or validating the result
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid PORT value: {0:?} (must be a number)")]
    InvalidPort(String),

    #[error(
        "missing required environment variables: [{}]. Please set them before running the application",
        .0.join(" ")
    )]
    Missing(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Production logging format (`APP_ENV=production`)
    #[serde(default)]
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            production: false,
        }
    }
}

/// Session cookies for the Gemini web backend
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub psid: String,
    #[serde(default)]
    pub psidts: String,
    #[serde(default)]
    pub psidcc: String,
    /// Raw `name=value; name=value` cookie header copied from a browser
    #[serde(default)]
    pub cookies: String,
    /// Cookie rotation interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: i64,
    #[serde(default = "default_cookie_cache_dir")]
    pub cookie_cache_dir: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            psid: String::new(),
            psidts: String::new(),
            psidcc: String::new(),
            cookies: String::new(),
            refresh_interval: default_refresh_interval(),
            cookie_cache_dir: default_cookie_cache_dir(),
        }
    }
}

impl GeminiConfig {
    /// Fill empty `__Secure-1PSID*` fields from the raw cookie header
    pub fn merge_cookie_header(&mut self) {
        for pair in self.cookies.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            let slot = match name.trim() {
                COOKIE_PSID => &mut self.psid,
                COOKIE_PSIDTS => &mut self.psidts,
                COOKIE_PSIDCC => &mut self.psidcc,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = value.trim().to_string();
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_provider")]
    pub provider_type: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_refresh_interval() -> i64 {
    DEFAULT_REFRESH_INTERVAL
}

fn default_cookie_cache_dir() -> String {
    DEFAULT_COOKIE_CACHE_DIR.to_string()
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub request: RequestConfig,
}

impl Config {
    /// Load `.env`, the optional TOML file and the environment, then validate
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.gemini.merge_cookie_header();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file without validating it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read configuration file")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Overlay environment variables read through `lookup`
    ///
    /// An empty `PORT` keeps the current port; a non-numeric one is an error.
    /// Non-numeric `GEMINI_REFRESH_INTERVAL` and `REQUEST_TIMEOUT` fall back
    /// to their defaults.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.server.log_level = level;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.server.production = env == "production";
        }

        if let Some(v) = lookup("GEMINI_1PSID") {
            self.gemini.psid = v;
        }
        if let Some(v) = lookup("GEMINI_1PSIDTS") {
            self.gemini.psidts = v;
        }
        if let Some(v) = lookup("GEMINI_1PSIDCC") {
            self.gemini.psidcc = v;
        }
        if let Some(v) = lookup("GEMINI_COOKIES") {
            self.gemini.cookies = v;
        }
        if let Some(v) = lookup("GEMINI_REFRESH_INTERVAL").filter(|v| !v.is_empty()) {
            self.gemini.refresh_interval = v.trim().parse().unwrap_or(DEFAULT_REFRESH_INTERVAL);
        }
        if let Some(v) = lookup("GEMINI_COOKIE_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.gemini.cookie_cache_dir = v;
        }

        if let Some(v) = lookup("PROVIDER_TYPE").filter(|v| !v.is_empty()) {
            self.providers.provider_type = v;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT").filter(|v| !v.is_empty()) {
            self.request.timeout_secs = v.trim().parse().unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        }

        Ok(())
    }

    /// Check that the backend has enough cookies to authenticate
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if self.gemini.psid.is_empty() {
            missing.push("GEMINI_1PSID".to_string());
        } else if self.gemini.psidts.is_empty()
            && self.gemini.psidcc.is_empty()
            && self.gemini.cookies.is_empty()
        {
            missing.push("GEMINI_1PSIDTS or GEMINI_1PSIDCC or GEMINI_COOKIES".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}
