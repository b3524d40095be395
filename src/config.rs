// src/config.rs
//! Orchard configuration
//!
//! # Example (TOML)
//!
//! ```toml
//! default_channel = "pkg.example.org"
//! preferred_state = "stable"
//! root = "/usr/local/orchard"
//! cache_ttl_secs = 3600
//! http_proxy = "http://proxy.local:3128"
//! runtime_version = "8.2.0"
//! extensions = ["zlib", "json"]
//!
//! [channels."pkg.example.org"]
//! base_url = "https://pkg.example.org/rest"
//! username = "deploy"
//! password = "secret"
//! ```

use crate::error::{Error, Result};
use crate::package::FileRole;
use crate::version::ReleaseState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Per-channel access settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// REST base URL (default: `https://{channel}/rest`)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ChannelConfig {
    /// Basic auth credentials, if both halves are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel used when a reference names none
    pub default_channel: String,

    /// Least stable release accepted unless a request says otherwise
    pub preferred_state: ReleaseState,

    /// Install root; role directories default to subdirectories of it
    pub root: PathBuf,

    pub code_dir: Option<PathBuf>,
    pub ext_dir: Option<PathBuf>,
    pub doc_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub test_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,

    /// Holds the registry database and the dependency store
    pub registry_dir: Option<PathBuf>,

    /// Metadata cache (default: `{root}/cache`)
    pub cache_dir: Option<PathBuf>,

    /// Archive download directory (default: `{root}/download`)
    pub download_dir: Option<PathBuf>,

    /// Seconds a cached metadata response is served without revalidation
    pub cache_ttl_secs: u64,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// Proxy URL, optionally with `user:pass@` credentials
    pub http_proxy: Option<String>,

    pub channels: BTreeMap<String, ChannelConfig>,

    /// Language runtime version used for runtime dependency checks
    pub runtime_version: String,

    /// Loaded runtime extensions
    pub extensions: Vec<String>,

    /// Server API name used for sapi dependency checks
    pub sapi: String,

    /// Staging prefix for building OS packages; role directories and the
    /// registry are relocated under it, caches are not
    pub packaging_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_channel: "pkg.orchard.dev".to_string(),
            preferred_state: ReleaseState::Stable,
            root: PathBuf::from("/usr/local/orchard"),
            code_dir: None,
            ext_dir: None,
            doc_dir: None,
            data_dir: None,
            test_dir: None,
            bin_dir: None,
            registry_dir: None,
            cache_dir: None,
            download_dir: None,
            cache_ttl_secs: 3600,
            timeout_secs: 30,
            http_proxy: None,
            channels: BTreeMap::new(),
            runtime_version: "8.2.0".to_string(),
            extensions: Vec::new(),
            sapi: "cli".to_string(),
            packaging_root: None,
        }
    }
}

impl Config {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Config rooted at `root` with every other setting at its default
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("orchard").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_channel.trim().is_empty() {
            return Err(Error::ConfigError("default_channel must not be empty".to_string()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(Error::ConfigError("root must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::ConfigError("timeout_secs must be positive".to_string()));
        }
        for (name, channel) in &self.channels {
            if let Some(ref base) = channel.base_url
                && url::Url::parse(base).is_err()
            {
                return Err(Error::ConfigError(format!(
                    "Channel {} has an invalid base_url: {}",
                    name, base
                )));
            }
            if channel.username.is_some() != channel.password.is_some() {
                return Err(Error::ConfigError(format!(
                    "Channel {} needs both username and password",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Directory files of `role` install under
    pub fn role_dir(&self, role: FileRole) -> PathBuf {
        let (configured, fallback) = match role {
            FileRole::RuntimeCode => (&self.code_dir, "code"),
            FileRole::ExtensionBinary => (&self.ext_dir, "ext"),
            FileRole::Doc => (&self.doc_dir, "doc"),
            FileRole::Data => (&self.data_dir, "data"),
            FileRole::Test => (&self.test_dir, "test"),
            FileRole::Script => (&self.bin_dir, "bin"),
            FileRole::Source => (&None, "src"),
        };
        self.packaged(configured.clone().unwrap_or_else(|| self.root.join(fallback)))
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.packaged(
            self.registry_dir
                .clone()
                .unwrap_or_else(|| self.root.join(".registry")),
        )
    }

    /// `path` relocated under the packaging root, if one is set
    fn packaged(&self, path: PathBuf) -> PathBuf {
        let Some(ref prefix) = self.packaging_root else {
            return path;
        };
        let relative: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        prefix.join(relative)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.root.join("cache"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| self.root.join("download"))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, channel)| channel)
    }

    /// REST base URL of a channel
    pub fn channel_base_url(&self, name: &str) -> String {
        self.channel(name)
            .and_then(|c| c.base_url.clone())
            .unwrap_or_else(|| format!("https://{}/rest", name))
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_toml("default_channel = \"pkg.example.org\"\n").unwrap();
        assert_eq!(config.default_channel, "pkg.example.org");
        assert_eq!(config.preferred_state, ReleaseState::Stable);
        assert_eq!(config.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_role_dirs_default_under_root() {
        let config = Config::with_root(Path::new("/opt/o"));
        assert_eq!(config.role_dir(FileRole::RuntimeCode), PathBuf::from("/opt/o/code"));
        assert_eq!(config.role_dir(FileRole::Script), PathBuf::from("/opt/o/bin"));
        assert_eq!(config.registry_dir(), PathBuf::from("/opt/o/.registry"));
    }

    #[test]
    fn test_packaging_root_relocates_install_paths() {
        let mut config = Config::with_root(Path::new("/opt/o"));
        config.bin_dir = Some(PathBuf::from("/usr/bin"));
        config.packaging_root = Some(PathBuf::from("/tmp/build"));

        assert_eq!(config.role_dir(FileRole::Doc), PathBuf::from("/tmp/build/opt/o/doc"));
        assert_eq!(config.role_dir(FileRole::Script), PathBuf::from("/tmp/build/usr/bin"));
        assert_eq!(config.registry_dir(), PathBuf::from("/tmp/build/opt/o/.registry"));
        assert_eq!(config.cache_dir(), PathBuf::from("/opt/o/cache"));
        assert_eq!(config.download_dir(), PathBuf::from("/opt/o/download"));
    }

    #[test]
    fn test_channel_settings() {
        let config = Config::from_toml(
            r#"
            preferred_state = "beta"

            [channels."pkg.example.org"]
            base_url = "https://mirror.example.org/rest/"
            username = "u"
            password = "p"
            "#,
        )
        .unwrap();

        assert_eq!(config.preferred_state, ReleaseState::Beta);
        assert_eq!(
            config.channel_base_url("PKG.example.org"),
            "https://mirror.example.org/rest"
        );
        assert_eq!(config.channel("pkg.example.org").unwrap().credentials(), Some(("u", "p")));
        assert_eq!(config.channel_base_url("other.org"), "https://other.org/rest");
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let result = Config::from_toml(
            r#"
            [channels.c]
            username = "u"
            "#,
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let result = Config::from_toml(
            r#"
            [channels.c]
            base_url = "not a url"
            "#,
        );
        assert!(result.is_err());
    }
}
