// Token/Info Parser for the authenticated landing page (index.jsp).
//
// The page embeds its session state as `Cyberoam.key = 'value';` assignments
// inside inline script blocks. The CSRF token normally sits under a fixed
// variable name; when a firmware release renames it, the new name is
// recovered from the `setCSRFToken(<name>)` call and searched for instead.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::device_info::{DeviceInfo, REQUIRED_KEYS};
use crate::error::Error;

/// Variable holding the CSRF token on current firmware.
pub const DEFAULT_CSRF_KEY: &str = "c$rFt0k3n";

static SCRIPT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script.*?>(?P<script>.*?)</script>").expect("script block pattern")
});

static JSP_VARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Cyberoam\.(?P<key>[a-zA-Z0-9!@#$%^&]+)\s*=\s*'?"?(?P<value>.*?)'?"?;"#)
        .expect("jsp variable pattern")
});

static CSRF_KEY_DISCOVERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"setCSRFToken\((?P<csrf_key>.*?)\)").expect("csrf key pattern")
});

// The firmware spells it both ways across releases.
static SUBSCRIPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:modulesubsctionList|moduleSubscriptionList)\s*=\s*(?P<subscriptions>\[.*\]);")
        .expect("subscription pattern")
});

static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").expect("newline pattern"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("space pattern"));

/// How the CSRF token was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Found under the expected variable name.
    DefaultKey,
    /// Found under a name recovered from `setCSRFToken(...)`.
    DiscoveredKey,
}

/// Parses landing pages into [`DeviceInfo`].
///
/// Stateless apart from the expected token variable name, so the same
/// parser gives the same result for the same page every time.
#[derive(Debug, Clone)]
pub struct IndexParser {
    csrf_key: String,
}

impl Default for IndexParser {
    fn default() -> Self {
        Self::new(DEFAULT_CSRF_KEY)
    }
}

impl IndexParser {
    pub fn new(csrf_key: impl Into<String>) -> Self {
        Self {
            csrf_key: csrf_key.into(),
        }
    }

    pub fn csrf_key(&self) -> &str {
        &self.csrf_key
    }

    pub fn parse(&self, raw: &str) -> Result<DeviceInfo, Error> {
        self.parse_with_source(raw).map(|(info, _)| info)
    }

    /// Parse and also report which lookup strategy yielded the token.
    pub fn parse_with_source(&self, raw: &str) -> Result<(DeviceInfo, TokenSource), Error> {
        let reduced = reduce_to_scripts(raw)?;
        let found = extract_key_values(raw)?;

        let (csrf_token, source) = self.find_token(&found, &reduced)?;
        let subscriptions_raw = find_subscriptions(raw);

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| !found.contains_key(**key))
            .map(|key| (*key).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(Error::KeyMissing { missing });
        }

        let field = |key: &str| found.get(key).cloned().unwrap_or_default();
        let info = DeviceInfo {
            csrf_token,
            model: field("displayModel"),
            display_version: field("displayVersion"),
            firmware_version: field("version"),
            serial_number: field("applianceKey"),
            company_name: field("companyName"),
            username: field("name"),
            raw_script_text: reduced,
            subscriptions_raw,
            found_keys: found,
        };

        debug!(
            keys = info.found_keys.len(),
            model = %info.model,
            source = ?source,
            "parsed landing page"
        );
        Ok((info, source))
    }

    fn find_token(
        &self,
        found: &IndexMap<String, String>,
        reduced: &str,
    ) -> Result<(String, TokenSource), Error> {
        if let Some(token) = found.get(&self.csrf_key) {
            return Ok((token.clone(), TokenSource::DefaultKey));
        }

        trace!(key = %self.csrf_key, "default token variable absent, discovering");
        let key = CSRF_KEY_DISCOVERY
            .captures(reduced)
            .and_then(|c| c.name("csrf_key"))
            .map(|m| m.as_str().trim().trim_start_matches("Cyberoam.").to_owned())
            .ok_or_else(|| Error::NoMatchFound {
                expected: "setCSRFToken(<key>) call".into(),
            })?;

        let pattern = format!(r"{}\s=\s'(?P<csrf_value>\w+)'", regex::escape(&key));
        let value_pattern = Regex::new(&pattern).map_err(|e| Error::NoMatchFound {
            expected: format!("usable token key '{key}': {e}"),
        })?;

        value_pattern
            .captures(reduced)
            .and_then(|c| c.name("csrf_value"))
            .map(|m| (m.as_str().to_owned(), TokenSource::DiscoveredKey))
            .ok_or_else(|| Error::NoMatchFound {
                expected: format!("value for token key '{key}'"),
            })
    }
}

/// Collapse tabs, CRLF, repeated newlines and repeated spaces.
fn trim(text: &str) -> String {
    let text = text.replace('\t', " ").replace("\r\n", "\n");
    let text = NEWLINES.replace_all(&text, "\n");
    SPACES.replace_all(&text, " ").into_owned()
}

fn reduce_to_scripts(raw: &str) -> Result<String, Error> {
    let reduced: String = SCRIPT_BLOCKS
        .captures_iter(raw)
        .filter_map(|c| c.name("script"))
        .map(|m| trim(m.as_str()))
        .collect();

    if reduced.is_empty() {
        return Err(Error::Processor {
            message: "no inline script content".into(),
        });
    }
    Ok(reduced)
}

fn extract_key_values(raw: &str) -> Result<IndexMap<String, String>, Error> {
    let found: IndexMap<String, String> = JSP_VARS
        .captures_iter(raw)
        .filter_map(|c| Some((c.name("key")?.as_str().to_owned(), c.name("value")?.as_str().to_owned())))
        .collect();

    if found.is_empty() {
        return Err(Error::KeyParsing {
            message: format!("no assignments in {} bytes of page text", raw.len()),
        });
    }
    Ok(found)
}

fn find_subscriptions(raw: &str) -> String {
    match SUBSCRIPTIONS
        .captures(raw)
        .and_then(|c| c.name("subscriptions"))
    {
        Some(m) => m.as_str().to_owned(),
        None => {
            warn!("no subscription list on landing page");
            "[]".to_owned()
        }
    }
}

/// Parse a landing page with the default token variable name.
pub fn parse_index(raw: &str) -> Result<DeviceInfo, Error> {
    IndexParser::default().parse(raw)
}
