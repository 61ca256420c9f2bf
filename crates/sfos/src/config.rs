//! CLI configuration: thin wrapper around `sfos_config` shared types.
//!
//! Adds the resolution that respects `GlobalOpts` flag overrides
//! (--hostname, --port, --password, etc.) and turns the flags, named
//! targets, and inventory files into one list of targets.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use secrecy::SecretString;

use sfos_api::{TemplateRegistry, TransportConfig};
use sfos_config::{TargetDefaults, keyring_password, load_inventory, resolve_target};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use sfos_config::{Config, TargetSpec, config_path, load_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Config defaults overridden by whichever flags were given.
pub fn target_defaults(config: &Config, global: &GlobalOpts) -> TargetDefaults {
    let mut fill = TargetDefaults::from_defaults(&config.defaults);
    if let Some(port) = global.port {
        fill.port = port;
    }
    if global.insecure {
        fill.verify_tls = false;
    }
    if let Some(timeout) = global.timeout {
        fill.timeout = timeout;
    }
    if let Some(ref username) = global.username {
        fill.username.clone_from(username);
    }
    if let Some(ref password) = global.password {
        fill.password = Some(SecretString::from(password.clone()));
    }
    fill
}

/// Apply flag overrides to a target resolved from the config file.
///
/// CLI flag overrides take priority over target values.
fn apply_flags(mut spec: TargetSpec, global: &GlobalOpts) -> TargetSpec {
    if let Some(port) = global.port {
        spec.port = port;
    }
    if global.insecure {
        spec.verify_tls = false;
    }
    if let Some(timeout) = global.timeout {
        spec.timeout = Duration::from_secs(timeout);
    }
    if let Some(ref username) = global.username {
        spec.username.clone_from(username);
    }
    if let Some(ref password) = global.password {
        spec.password = SecretString::from(password.clone());
    }
    spec
}

/// Every target selected by the flags: `--hostname` first, then named
/// targets, then inventory records. Repeats of a `host:port` are dropped.
pub fn resolve_targets(config: &Config, global: &GlobalOpts) -> Result<Vec<TargetSpec>, CliError> {
    let fill = target_defaults(config, global);
    let mut targets = Vec::new();

    // 1. Ad-hoc hostname
    if let Some(ref hostname) = global.hostname {
        let password = fill
            .password
            .clone()
            .or_else(|| keyring_password(hostname))
            .ok_or_else(|| CliError::NoCredentials {
                target: hostname.clone(),
            })?;
        targets.push(TargetSpec {
            name: hostname.clone(),
            hostname: hostname.clone(),
            port: fill.port,
            verify_tls: fill.verify_tls,
            timeout: Duration::from_secs(fill.timeout),
            username: fill.username.clone(),
            password,
        });
    }

    // 2. Named targets from the config file
    for name in &global.target {
        targets.push(apply_flags(resolve_target(config, name)?, global));
    }

    // 3. Inventory files
    if !global.inventory.is_empty() {
        targets.extend(load_inventory(&global.inventory, &fill)?);
    }

    let mut seen = Vec::with_capacity(targets.len());
    targets.retain(|t| {
        let key = (t.hostname.clone(), t.port);
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });

    if targets.is_empty() {
        return Err(CliError::NoTargets {
            path: config_path().display().to_string(),
        });
    }
    Ok(targets)
}

/// `--output`, else the configured default.
pub fn output_format(config: &Config, global: &GlobalOpts) -> Result<OutputFormat, CliError> {
    if let Some(format) = global.output {
        return Ok(format);
    }
    OutputFormat::from_str(&config.defaults.output, true).map_err(|_| CliError::Validation {
        field: "defaults.output".into(),
        reason: format!(
            "expected table, json, json-compact or yaml, got '{}'",
            config.defaults.output
        ),
    })
}

/// `--concurrency`, else the configured default; never zero.
pub fn concurrency(config: &Config, global: &GlobalOpts) -> usize {
    global
        .concurrency
        .unwrap_or(config.defaults.concurrency)
        .max(1)
}

/// Template directories from flags, then the config file.
pub fn template_registry(config: &Config, global: &GlobalOpts) -> TemplateRegistry {
    let paths: Vec<PathBuf> = global
        .templates
        .iter()
        .chain(&config.templates.search_paths)
        .cloned()
        .collect();
    TemplateRegistry::with_search_paths(paths)
}

pub fn transport_config(config: &Config) -> TransportConfig {
    TransportConfig {
        ca_cert: config.defaults.ca_cert.clone(),
    }
}
