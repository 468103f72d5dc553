//! Configuration loading and resolution
//!
//! Every setting is resolved with the same priority order:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: the daemon logs a warning and runs on
//! environment + defaults. A TOML file that exists but cannot be parsed is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Base URL of the ingestion API
pub const ENV_API_URL: &str = "API_URL";
/// Root directory to watch
pub const ENV_WATCH_DIR: &str = "WATCH_DIR";
/// Explicit TOML config file location
pub const ENV_CONFIG_PATH: &str = "INDEXER_CONFIG";

/// Path prefix of the audio resource on the ingestion API
pub const API_PATH_PREFIX: &str = "/api/audio";

const DEFAULT_API_URL: &str = "http://localhost:8080";
const CONFIG_DIR_NAME: &str = "audio-indexer";
const CONFIG_FILE_NAME: &str = "daemon.toml";

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_url: String,
    pub watch_dir: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            watch_dir: default_watch_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Platform Music directory (`~/Music`, `%USERPROFILE%\Music`, ...)
fn default_watch_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("./Music"))
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// TOML file schema
// ============================================================================

/// Daemon configuration file
///
/// All fields are optional; anything absent falls through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Base URL of the ingestion API (without the `/api/audio` suffix)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Root directory to watch recursively
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub stability: StabilityConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Upload retry and timeout settings
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    /// Total attempts for one body upload, first attempt included
    pub max_retries: u32,
    /// Fixed wait between a failed attempt and the next one
    pub retry_delay_ms: u64,
    /// Per-request timeout for the body upload
    pub timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5_000,
            timeout_ms: 300_000,
        }
    }
}

/// Write-stability detection settings
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilityConfig {
    /// Quiet period with no size/mtime change before a file counts as written
    pub threshold_ms: u64,
    /// How often pending files are re-examined
    pub poll_interval_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 2_000,
            poll_interval_ms: 100,
        }
    }
}

/// Watch-root settings
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Wait between attempts to watch a root that is missing or unreadable
    pub root_retry_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_retry_ms: 5_000,
        }
    }
}

/// Default TOML location: `<config_dir>/audio-indexer/daemon.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load a TOML config file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    Ok(Some(config))
}

// ============================================================================
// Resolution
// ============================================================================

/// Fully resolved daemon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Base API URL, trailing slashes removed
    pub api_url: String,
    pub watch_dir: PathBuf,
    pub log_level: String,
    pub upload: UploadConfig,
    pub stability: StabilityConfig,
    pub watch: WatchConfig,
}

impl ResolvedConfig {
    /// Audio resource endpoint, e.g. `http://localhost:8080/api/audio`
    pub fn api_endpoint(&self) -> String {
        format!("{}{}", self.api_url, API_PATH_PREFIX)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        validate_api_url(&self.api_url)?;

        if self.upload.max_retries == 0 {
            return Err(Error::InvalidInput(
                "upload.max_retries must be at least 1".to_string(),
            ));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "stability.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.stability.threshold_ms < self.stability.poll_interval_ms {
            return Err(Error::InvalidInput(format!(
                "stability.threshold_ms ({}) must not be shorter than poll_interval_ms ({})",
                self.stability.threshold_ms, self.stability.poll_interval_ms
            )));
        }
        if self.watch.root_retry_ms == 0 {
            return Err(Error::InvalidInput(
                "watch.root_retry_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_api_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw)
        .map_err(|e| Error::InvalidInput(format!("Invalid API URL {}: {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!("API URL must be http(s): {}", raw)));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidInput(format!("API URL has no host: {}", raw)));
    }

    Ok(())
}

/// Resolves the daemon configuration from environment, TOML file and defaults
pub struct ConfigResolver {
    config_path: Option<PathBuf>,
    defaults: CompiledDefaults,
}

impl ConfigResolver {
    /// Resolver using `INDEXER_CONFIG` or the default config file location
    pub fn new() -> Self {
        let config_path = std::env::var_os(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .or_else(default_config_path);

        Self {
            config_path,
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    /// Resolver reading a specific TOML file
    pub fn with_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Resolve and validate all settings
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let toml_config = match &self.config_path {
            Some(path) => match load_toml_config(path)? {
                Some(config) => {
                    info!("Loaded config file: {}", path.display());
                    config
                }
                None => {
                    warn!(
                        "Config file not found at {}, using environment and defaults",
                        path.display()
                    );
                    TomlConfig::default()
                }
            },
            None => {
                debug!("No config directory on this platform, skipping TOML config");
                TomlConfig::default()
            }
        };

        let api_url = non_empty_env(ENV_API_URL)
            .or(toml_config.api_url)
            .unwrap_or_else(|| self.defaults.api_url.clone());

        let watch_dir = non_empty_env(ENV_WATCH_DIR)
            .map(PathBuf::from)
            .or(toml_config.watch_dir)
            .unwrap_or_else(|| self.defaults.watch_dir.clone());

        let resolved = ResolvedConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            watch_dir,
            log_level: toml_config.logging.level,
            upload: toml_config.upload,
            stability: toml_config.stability,
            watch: toml_config.watch,
        };

        resolved.validate()?;
        Ok(resolved)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
