//! Shared configuration for SFOS tools.
//!
//! TOML config with an environment overlay, named targets, YAML inventory
//! files, and credential resolution (env + keyring + plaintext) into the
//! `Address`/`Credentials` pairs `sfos_api` connects with. The CLI layers
//! its flag overrides on top through [`TargetDefaults`].

pub mod inventory;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use sfos_api::{Address, Credentials};

pub use inventory::{InventoryRecord, load_inventory, read_inventory_file};

/// Keyring service name; entries are stored as `<target>/password`.
pub const KEYRING_SERVICE: &str = "sfos";
/// Environment fallback for the firewall username.
pub const USERNAME_ENV: &str = "FW_USERNAME";
/// Environment fallback for the firewall password.
pub const PASSWORD_ENV: &str = "FW_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for target '{target}'")]
    NoCredentials { target: String },

    #[error("target '{name}' not found in configuration")]
    UnknownTarget { name: String, available: Vec<String> },

    #[error("failed to read inventory {}: {message}", path.display())]
    Inventory { path: PathBuf, message: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub templates: TemplateSettings,

    /// Named firewalls.
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_username")]
    pub username: String,

    /// Targets processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_output")]
    pub output: String,

    /// Extra CA bundle (PEM) trusted when verifying appliance certificates.
    pub ca_cert: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            verify_tls: default_verify_tls(),
            timeout: default_timeout(),
            username: default_username(),
            concurrency: default_concurrency(),
            output: default_output(),
            ca_cert: None,
        }
    }
}

fn default_port() -> u16 {
    sfos_api::address::DEFAULT_PORT
}
fn default_verify_tls() -> bool {
    true
}
fn default_timeout() -> u64 {
    sfos_api::address::DEFAULT_TIMEOUT.as_secs()
}
fn default_username() -> String {
    "admin".into()
}
fn default_concurrency() -> usize {
    4
}
fn default_output() -> String {
    "table".into()
}

/// Where request templates are looked up, ahead of the built-in set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplateSettings {
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

/// A named firewall.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Target {
    pub hostname: String,

    pub port: Option<u16>,

    pub verify_tls: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "sophos", "sfos").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sfos");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (a missing file is not an error) + `SFOS_` environment.
///
/// Nested keys use a double underscore: `SFOS_DEFAULTS__VERIFY_TLS=false`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SFOS_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), targets = config.targets.len(), "configuration loaded");
    Ok(config)
}

// ── Resolved targets ────────────────────────────────────────────────

/// Fill values for anything a target or inventory record leaves out.
///
/// Built from [`Defaults`] and then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct TargetDefaults {
    pub port: u16,
    pub verify_tls: bool,
    pub timeout: u64,
    pub username: String,
    pub password: Option<SecretString>,
}

impl TargetDefaults {
    /// Config defaults with `FW_USERNAME`/`FW_PASSWORD` applied.
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            port: defaults.port,
            verify_tls: defaults.verify_tls,
            timeout: defaults.timeout,
            username: std::env::var(USERNAME_ENV).unwrap_or_else(|_| defaults.username.clone()),
            password: std::env::var(PASSWORD_ENV).ok().map(SecretString::from),
        }
    }
}

/// A firewall with everything needed to open a session.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Profile name, or the hostname for inventory and ad-hoc targets.
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub username: String,
    pub password: SecretString,
}

impl TargetSpec {
    pub fn address(&self) -> Address {
        Address::new(self.hostname.clone())
            .with_port(self.port)
            .with_verify_tls(self.verify_tls)
            .with_timeout(self.timeout)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.expose_secret())
    }
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Look up `<name>/password` in the system keyring.
pub fn keyring_password(name: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{name}/password")).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// Password for a named target, without the CLI flag step.
pub fn resolve_password(target: &Target, name: &str) -> Result<SecretString, ConfigError> {
    // 1. Target's password_env → env var lookup
    if let Some(ref env_name) = target.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. FW_PASSWORD
    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Some(secret) = keyring_password(name) {
        return Ok(secret);
    }

    // 4. Plaintext in config
    if let Some(ref pw) = target.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        target: name.into(),
    })
}

/// Username for a named target: target → `FW_USERNAME` → defaults.
pub fn resolve_username(target: &Target, defaults: &Defaults) -> String {
    target
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .unwrap_or_else(|| defaults.username.clone())
}

/// Build a [`TargetSpec`] for a configured target, no CLI overrides.
pub fn resolve_target(config: &Config, name: &str) -> Result<TargetSpec, ConfigError> {
    let target = config
        .targets
        .get(name)
        .ok_or_else(|| ConfigError::UnknownTarget {
            name: name.into(),
            available: config.targets.keys().cloned().collect(),
        })?;

    if target.hostname.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: format!("targets.{name}.hostname"),
            reason: "must not be empty".into(),
        });
    }

    Ok(TargetSpec {
        name: name.into(),
        hostname: target.hostname.clone(),
        port: target.port.unwrap_or(config.defaults.port),
        verify_tls: target.verify_tls.unwrap_or(config.defaults.verify_tls),
        timeout: Duration::from_secs(target.timeout.unwrap_or(config.defaults.timeout)),
        username: resolve_username(target, &config.defaults),
        password: resolve_password(target, name)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
[defaults]
timeout = 20

[templates]
search_paths = ["/etc/sfos/templates"]

[targets.edge]
hostname = "fw-edge.example.net"
port = 443
username = "ops"
password = "plain-secret"

[targets.core]
hostname = "10.0.0.1"
verify_tls = false
password_env = "HOME"
"#;

    fn sample_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = load_config_from(&path).unwrap();
        (dir, config)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults.port, 4444);
        assert!(config.defaults.verify_tls);
        assert_eq!(config.defaults.timeout, 10);
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.defaults.output, "table");
        assert!(config.targets.is_empty());
    }

    #[test]
    fn file_values_overlay_defaults() {
        let (_dir, config) = sample_config();
        assert_eq!(config.defaults.timeout, 20);
        assert_eq!(config.defaults.port, 4444);
        assert_eq!(
            config.templates.search_paths,
            vec![PathBuf::from("/etc/sfos/templates")]
        );
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets["edge"].port, Some(443));
    }

    #[test]
    fn resolve_target_fills_from_defaults() {
        let (_dir, config) = sample_config();
        let spec = resolve_target(&config, "core").unwrap();
        assert_eq!(spec.port, 4444);
        assert!(!spec.verify_tls);
        assert_eq!(spec.timeout, Duration::from_secs(20));

        let address = spec.address();
        assert_eq!(address.authority(), "10.0.0.1:4444");
        assert!(!address.verify_tls());
    }

    #[test]
    fn password_env_is_consulted_first() {
        let (_dir, config) = sample_config();
        let spec = resolve_target(&config, "core").unwrap();
        assert_eq!(
            spec.password.expose_secret(),
            std::env::var("HOME").unwrap()
        );
    }

    #[test]
    fn plaintext_password_is_the_last_resort() {
        if std::env::var(PASSWORD_ENV).is_ok() {
            return;
        }
        let (_dir, config) = sample_config();
        let spec = resolve_target(&config, "edge").unwrap();
        assert_eq!(spec.password.expose_secret(), "plain-secret");
        assert_eq!(spec.credentials().username(), "ops");
    }

    #[test]
    fn unknown_target_lists_available() {
        let (_dir, config) = sample_config();
        match resolve_target(&config, "branch").unwrap_err() {
            ConfigError::UnknownTarget { name, available } => {
                assert_eq!(name, "branch");
                assert_eq!(available, vec!["core".to_owned(), "edge".to_owned()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
