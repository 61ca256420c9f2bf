//! YAML inventory files.
//!
//! An inventory is a list of firewall records:
//!
//! ```yaml
//! - hostname: fw-branch-01
//!   port: 4444
//!   verify-tls: false
//! - hostname: 10.20.0.1
//!   username: audit
//! ```
//!
//! Records missing a field take it from [`TargetDefaults`]. Several files
//! may be combined; a record that is identical to one already seen (after
//! filling) is dropped, so the first occurrence wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConfigError, TargetDefaults, TargetSpec, keyring_password};

/// One firewall as written in an inventory file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InventoryRecord {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, alias = "verify-tls", skip_serializing_if = "Option::is_none")]
    pub verify_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl InventoryRecord {
    fn filled(&self, fill: &TargetDefaults) -> Self {
        Self {
            hostname: self.hostname.trim().to_owned(),
            port: Some(self.port.unwrap_or(fill.port)),
            verify_tls: Some(self.verify_tls.unwrap_or(fill.verify_tls)),
            username: Some(
                self.username
                    .clone()
                    .unwrap_or_else(|| fill.username.clone()),
            ),
            password: self.password.clone(),
        }
    }

    fn into_spec(self, fill: &TargetDefaults) -> Result<TargetSpec, ConfigError> {
        let password = match self.password {
            Some(pw) => SecretString::from(pw),
            None => fill
                .password
                .clone()
                .or_else(|| keyring_password(&self.hostname))
                .ok_or_else(|| ConfigError::NoCredentials {
                    target: self.hostname.clone(),
                })?,
        };

        Ok(TargetSpec {
            name: self.hostname.clone(),
            port: self.port.unwrap_or(fill.port),
            verify_tls: self.verify_tls.unwrap_or(fill.verify_tls),
            timeout: Duration::from_secs(fill.timeout),
            username: self.username.unwrap_or_else(|| fill.username.clone()),
            hostname: self.hostname,
            password,
        })
    }
}

/// Read the records of one inventory file. An empty file has none.
pub fn read_inventory_file(path: &Path) -> Result<Vec<InventoryRecord>, ConfigError> {
    let inventory_error = |message: String| ConfigError::Inventory {
        path: path.to_path_buf(),
        message,
    };

    let text = std::fs::read_to_string(path).map_err(|e| inventory_error(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Option<Vec<InventoryRecord>> =
        serde_yaml::from_str(&text).map_err(|e| inventory_error(e.to_string()))?;
    let records = records.unwrap_or_default();

    if let Some(pos) = records.iter().position(|r| r.hostname.trim().is_empty()) {
        return Err(inventory_error(format!("record {} has no hostname", pos + 1)));
    }

    debug!(path = %path.display(), records = records.len(), "read inventory file");
    Ok(records)
}

/// Combine inventory files into targets, filling gaps from `fill`.
pub fn load_inventory(
    paths: &[PathBuf],
    fill: &TargetDefaults,
) -> Result<Vec<TargetSpec>, ConfigError> {
    let mut combined: Vec<InventoryRecord> = Vec::new();
    for path in paths {
        for record in read_inventory_file(path)? {
            let record = record.filled(fill);
            if !combined.contains(&record) {
                combined.push(record);
            }
        }
    }

    info!(
        count = combined.len(),
        "{} found in inventory",
        if combined.len() == 1 { "firewall" } else { "firewalls" }
    );

    combined
        .into_iter()
        .map(|record| record.into_spec(fill))
        .collect()
}
