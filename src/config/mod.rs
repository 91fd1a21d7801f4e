//! Configuration management for Lectio.
//!
//! Configuration is read from `~/.config/lectio/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! The endpoint URL and API key may also come from `LECTIO_URL` and
//! `LECTIO_API_KEY`, which take precedence over the file.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const URL_ENV: &str = "LECTIO_URL";
pub const API_KEY_ENV: &str = "LECTIO_API_KEY";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub library: LibraryConfig,
}

/// Backend endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds (default: 10)
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Default windows for the shared query cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a cached result is refreshed in the background (default: 300)
    pub stale_time_secs: u64,
    /// Idle time after which an entry is evicted (default: 1800)
    pub gc_time_secs: u64,
    /// How often the janitor task sweeps idle entries (default: 60)
    pub janitor_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: 300,
            gc_time_secs: 1800,
            janitor_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_secs(self.gc_time_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}

/// How verse → Catechism paragraph links are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// One call to the `get_ccc_links_for_verse_ids` procedure.
    #[default]
    Rpc,
    /// Two table queries: verse → reference id → paragraph.
    Join,
}

/// Reading defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Language name used for titles, slugs and versions
    pub language: String,
    /// Version picked by the prefetcher and `read` when none is given
    pub default_version_id: i64,
    pub catechism_links: LinkStrategy,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            language: "Français".to_string(),
            default_version_id: 1,
            catechism_links: LinkStrategy::Rpc,
        }
    }
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        let config = Self::load_from(&config_path)?;
        Ok(config.with_overrides(
            std::env::var(URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        ))
    }

    /// Load configuration from an explicit path, creating it if missing.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/lectio/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("lectio").join("config.toml"))
    }

    /// Replace the endpoint settings with non-blank override values.
    pub fn with_overrides(mut self, url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.remote.url = url;
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.remote.api_key = key;
        }
        self
    }

    /// Check that the remote endpoint is usable. Called before any remote client is built.
    pub fn validate_remote(&self) -> Result<(), ConfigError> {
        if self.remote.url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "remote.url",
                env: URL_ENV,
            });
        }
        if self.remote.api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "remote.api_key",
                env: API_KEY_ENV,
            });
        }
        url::Url::parse(&self.remote.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.remote.url.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Lectio Configuration
#
# The endpoint URL and API key are required. They can also be supplied
# through the LECTIO_URL and LECTIO_API_KEY environment variables, which
# take precedence over this file.

[remote]
url = ""
api_key = ""
# Request timeout in seconds
timeout_secs = 10

[cache]
# Results older than this are served, then refreshed in the background
stale_time_secs = 300
# Entries unused for this long are evicted
gc_time_secs = 1800
# Sweep interval for idle entries
janitor_interval_secs = 60

[library]
# Language used for book titles, slugs and versions
language = "Français"
# Version used when none is requested
default_version_id = 1
# "rpc" uses get_ccc_links_for_verse_ids, "join" queries the index tables
catechism_links = "rpc"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing required setting {key} (set it in the config file or {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
    },

    #[error("Invalid endpoint URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.cache.stale_time_secs, 300);
        assert_eq!(config.cache.gc_time_secs, 1800);
        assert_eq!(config.library.language, "Français");
        assert_eq!(config.library.catechism_links, LinkStrategy::Rpc);
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[library]
catechism_links = "join"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.library.catechism_links, LinkStrategy::Join);
        assert_eq!(config.library.default_version_id, 1);
        assert_eq!(config.remote.timeout_secs, 10);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lectio").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(config.remote.url.is_empty());

        // Reloading the generated file gives the same values
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.cache.janitor_interval_secs, 60);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\nstale_time_secs = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_endpoint_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            config.validate_remote(),
            Err(ConfigError::Missing { key: "remote.url", .. })
        ));

        let config = Config::default().with_overrides(Some("https://db.example.com".into()), None);
        assert!(matches!(
            config.validate_remote(),
            Err(ConfigError::Missing { key: "remote.api_key", .. })
        ));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let content = r##"
[remote]
url = "https://file.example.com"
api_key = "file-key"
"##;
        let config: Config = toml::from_str(content).unwrap();
        let config =
            config.with_overrides(Some("https://env.example.com".into()), Some("  ".into()));

        assert_eq!(config.remote.url, "https://env.example.com");
        assert_eq!(config.remote.api_key, "file-key");
        assert!(config.validate_remote().is_ok());
    }

    #[test]
    fn test_malformed_url_rejected() {
        let config = Config::default().with_overrides(Some("not a url".into()), Some("key".into()));
        assert!(matches!(
            config.validate_remote(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
