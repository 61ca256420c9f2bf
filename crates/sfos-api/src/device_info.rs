use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::subscription::{Subscription, decode_subscriptions};

/// Landing-page variables every DeviceInfo must carry, in reporting order.
pub const REQUIRED_KEYS: &[&str] = &[
    "displayModel",
    "displayVersion",
    "version",
    "applianceKey",
    "companyName",
    "name",
];

/// Identity and license metadata scraped from an authenticated landing page.
///
/// Only ever constructed fully populated; see [`crate::parser::IndexParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub csrf_token: String,
    pub model: String,
    pub display_version: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub company_name: String,
    pub username: String,
    /// Concatenated, whitespace-reduced script blocks of the page.
    pub raw_script_text: String,
    /// Every `Cyberoam.key = value;` pair found, in page order.
    pub found_keys: IndexMap<String, String>,
    /// The subscription array as embedded in the page.
    pub subscriptions_raw: String,
}

/// The identity fields reported for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "displayVersion")]
    pub display_version: String,
    pub version: String,
    pub serial_number: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    pub username: String,
}

impl DeviceInfo {
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            model: self.model.clone(),
            display_version: self.display_version.clone(),
            version: self.firmware_version.clone(),
            serial_number: self.serial_number.clone(),
            company_name: self.company_name.clone(),
            username: self.username.clone(),
        }
    }

    /// Decoded subscriptions, bundles first.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        decode_subscriptions(&self.subscriptions_raw)
    }

    /// Look up any variable found on the landing page.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.found_keys.get(key).map(String::as_str)
    }
}

impl Serialize for DeviceInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.summary().serialize(serializer)
    }
}
