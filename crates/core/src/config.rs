//! TOML-based configuration for compsync.
//!
//! Every field has a default, so an absent file or an empty `[section]`
//! yields a working configuration for the anonymous public mirror. The FTP
//! password, when one is needed, is never stored in the file: `password_env`
//! names an environment variable that is resolved at runtime via
//! [`CompsyncConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompsyncConfig {
    /// Remote FTP server settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Names of the working subdirectories.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Deny-list and release-batch policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote FTP server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// FTP server host name.
    #[serde(default = "default_host")]
    pub host: String,

    /// FTP login.
    #[serde(default = "default_user")]
    pub user: String,

    /// Environment variable holding the FTP password. Unset = empty password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Seconds to wait for the server to answer a connection attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transfer tool executable.
    #[serde(default = "default_curl_binary")]
    pub curl_binary: String,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "ftp.galaktika.ru".into()
}
fn default_user() -> String {
    "anonymous".into()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_curl_binary() -> String {
    "curl".into()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: default_user(),
            password_env: None,
            timeout_secs: default_timeout_secs(),
            curl_binary: default_curl_binary(),
            password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Subdirectory names, relative to the local root / component directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Subdirectory receiving freshly downloaded files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Subdirectory receiving outdated component versions.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

fn default_staging_dir() -> String {
    "NEW".into()
}
fn default_archive_dir() -> String {
    "OLD".into()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// When the deny-list is consulted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DenyListPolicy {
    /// Decided per run by probing the network path to the server.
    #[default]
    Auto,
    /// Always filter through the deny-list.
    Always,
    /// Never filter.
    Never,
}

impl DenyListPolicy {
    /// Resolve the policy to an on/off decision. `probe` is only invoked
    /// for [`DenyListPolicy::Auto`].
    pub fn is_active_with(self, probe: impl FnOnce() -> bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => probe(),
        }
    }
}

impl FromStr for DenyListPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown deny-list policy '{}': use auto, always or never",
                other
            )),
        }
    }
}

impl std::fmt::Display for DenyListPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Deny-list and release-batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// When to apply the deny-list.
    #[serde(default)]
    pub deny_list: DenyListPolicy,

    /// File with one denied component filename per line.
    #[serde(default = "default_deny_list_file")]
    pub deny_list_file: PathBuf,

    /// Address prefix of the local network. An outbound address inside it
    /// means the VPN is down and the deny-list applies (`auto` policy).
    #[serde(default = "default_lan_prefix")]
    pub lan_prefix: String,

    /// Terminal remote directory name that marks a release batch.
    #[serde(default = "default_release_marker")]
    pub release_marker: String,

    /// Manifest fetched after a release batch download.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

fn default_deny_list_file() -> PathBuf {
    PathBuf::from("stop_list.txt")
}
fn default_lan_prefix() -> String {
    "192.168.".into()
}
fn default_release_marker() -> String {
    "UPDATES".into()
}
fn default_manifest_file() -> String {
    "UPDATES.sfv".into()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            deny_list: DenyListPolicy::default(),
            deny_list_file: default_deny_list_file(),
            lan_prefix: default_lan_prefix(),
            release_marker: default_release_marker(),
            manifest_file: default_manifest_file(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log file written alongside console output. Unset = console only.
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("compsync.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl CompsyncConfig {
    /// Load a [`CompsyncConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: CompsyncConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `remote.password_env` from the environment.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(env_name) = self.remote.password_env.as_deref() {
            self.remote.password = resolve_optional_env(env_name, "remote.password_env");
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.host.trim().is_empty() {
            return Err(invalid("remote.host", "FTP host must not be empty"));
        }
        if self.remote.timeout_secs == 0 {
            return Err(invalid("remote.timeout_secs", "timeout must be > 0"));
        }
        if self.remote.curl_binary.trim().is_empty() {
            return Err(invalid("remote.curl_binary", "must name an executable"));
        }

        validate_subdir_name("layout.staging_dir", &self.layout.staging_dir)?;
        validate_subdir_name("layout.archive_dir", &self.layout.archive_dir)?;
        if self.layout.staging_dir == self.layout.archive_dir {
            return Err(invalid(
                "layout.archive_dir",
                "staging and archive directories must differ",
            ));
        }

        if self.policy.manifest_file.trim().is_empty() {
            return Err(invalid("policy.manifest_file", "must not be empty"));
        }
        if self.policy.release_marker.trim().is_empty() {
            return Err(invalid("policy.release_marker", "must not be empty"));
        }

        if !LOG_LEVELS.contains(&self.logging.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(
                "logging.log_level",
                "must be one of trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# compsync configuration

[remote]
host = "ftp.galaktika.ru"
user = "anonymous"
# password_env = "COMPSYNC_FTP_PASSWORD"
timeout_secs = 5
curl_binary = "curl"

[layout]
staging_dir = "NEW"
archive_dir = "OLD"

[policy]
deny_list = "auto"          # auto | always | never
deny_list_file = "stop_list.txt"
lan_prefix = "192.168."
release_marker = "UPDATES"
manifest_file = "UPDATES.sfv"

[logging]
log_level = "info"
log_file = "compsync.log"
"#
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

fn validate_subdir_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(invalid(field, "must be a plain subdirectory name"));
    }
    Ok(())
}

/// Try to read an environment variable by name.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
