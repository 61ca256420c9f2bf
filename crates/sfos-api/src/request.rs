// Request Builder: turns a Definition plus an Address into a concrete request.
//
// Field order in the body is fixed: mode, operation, requestObj, json,
// __RequestType, t. POST bodies are newline-joined unless the definition asks
// for URL encoding; GET requests always carry the fields `&`-joined in the
// query string and never have a body.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::address::Address;
use crate::template::Definition;

/// User agent advertised to the appliance.
pub const USER_AGENT: &str = "GroundControl/1.0";

/// Marker field the controller expects on every AJAX call.
const REQUEST_TYPE_FIELD: &str = "__RequestType=ajax";

/// HTTP method of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[serde(alias = "GET")]
    Get,
    #[default]
    #[serde(alias = "POST")]
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A fully assembled request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRequest {
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
    pub method: HttpMethod,
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl BuiltRequest {
    /// Copy of this request with `name` set to `value`, replacing any
    /// existing header of that name regardless of case.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut headers = self.headers.clone();
        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        headers.insert(name.to_owned(), value.to_owned());
        Self {
            headers,
            ..self.clone()
        }
    }

    /// Value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ── Common headers ──────────────────────────────────────────────────

const COMMON_HEADERS: &[(&str, &str)] = &[
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("DNT", "1"),
    ("Host", "{HOST}:{PORT}"),
    ("User-Agent", "{USER_AGENT}"),
];

const GET_HEADERS: &[(&str, &str)] = &[(
    "Accept",
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
     image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
)];

const POST_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/plain, */*; q=0.01"),
    (
        "Content-Type",
        "application/x-www-form-urlencoded; charset=UTF-8",
    ),
    ("Origin", "{ROOT_URL}"),
];

/// Browser-like headers sent with every request of `method`, before the
/// definition's own headers are layered on top.
pub fn common_headers(method: HttpMethod) -> IndexMap<String, String> {
    let specific = match method {
        HttpMethod::Get => GET_HEADERS,
        HttpMethod::Post => POST_HEADERS,
    };
    COMMON_HEADERS
        .iter()
        .chain(specific)
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Replace `{HOST}`, `{PORT}`, `{USER_AGENT}`, `{ROOT_URL}`,
/// `{CONTROLLER_URL}`, `{INDEX_JSP_URL}` and `{LOGIN_URL}` in header values.
pub fn interpolate_headers(
    headers: &IndexMap<String, String>,
    address: &Address,
) -> IndexMap<String, String> {
    let replacements = [
        ("{HOST}", address.hostname().to_owned()),
        ("{PORT}", address.port().to_string()),
        ("{USER_AGENT}", USER_AGENT.to_owned()),
        ("{ROOT_URL}", address.base_url()),
        ("{CONTROLLER_URL}", address.controller_url()),
        ("{INDEX_JSP_URL}", address.index_url()),
        ("{LOGIN_URL}", address.login_url()),
    ];

    headers
        .iter()
        .map(|(name, value)| {
            if !value.contains('{') {
                return (name.clone(), value.clone());
            }
            let value = replacements
                .iter()
                .fold(value.clone(), |acc, (placeholder, replacement)| {
                    acc.replace(placeholder, replacement)
                });
            (name.clone(), value)
        })
        .collect()
}

// ── Body assembly ───────────────────────────────────────────────────

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Millisecond request timestamp, strictly increasing within the process.
pub fn request_timestamp() -> u64 {
    let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let previous = LAST_TIMESTAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// GET fields travel in the query string, so they are always encoded.
fn url_encoded(definition: &Definition) -> bool {
    definition.urlencode || definition.method == HttpMethod::Get
}

/// The ordered `key=value` fields of a request body. Empty when the
/// definition has no mode.
fn body_fields(definition: &Definition, payload: Option<&str>) -> Vec<String> {
    if definition.mode == 0 {
        return Vec::new();
    }

    let urlencode = url_encoded(definition);
    let render = |value: &str| {
        if urlencode {
            encode(value)
        } else {
            value.to_owned()
        }
    };

    let mut fields = vec![format!("mode={}", definition.mode)];
    if definition.operation != 0 {
        fields.push(format!("operation={}", definition.operation));
    }
    if let Some(object) = definition.request_object_text() {
        fields.push(format!("requestObj={}", render(&object)));
    }
    if let Some(payload) = payload.filter(|p| !p.is_empty()) {
        fields.push(format!("json={}", render(payload)));
    }
    fields.push(REQUEST_TYPE_FIELD.to_owned());
    fields.push(format!("t={}", request_timestamp()));
    fields
}

/// Join the body fields with the definition's separator. Query strings
/// are always `&`-joined.
pub fn assemble_body(definition: &Definition, payload: Option<&str>) -> String {
    let fields = body_fields(definition, payload);
    let separator = match definition.separator.as_deref() {
        Some(separator) if definition.method == HttpMethod::Post => separator,
        _ if url_encoded(definition) => "&",
        _ => "\n",
    };
    fields.join(separator)
}

/// Build a concrete request for `definition` against `address`.
///
/// `payload` is the already-serialised `json=` value.
pub fn build(definition: &Definition, address: &Address, payload: Option<&str>) -> BuiltRequest {
    let content = assemble_body(definition, payload);
    let base = address.url(&definition.path);

    let (url, body) = match definition.method {
        HttpMethod::Get if content.is_empty() => (base, None),
        HttpMethod::Get => (format!("{base}?{content}"), None),
        HttpMethod::Post => (base, Some(content)),
    };

    trace!(method = %definition.method, url = %url, mode = definition.mode, "built request");

    BuiltRequest {
        url,
        headers: interpolate_headers(&definition.headers, address),
        body,
        method: definition.method,
        verify_tls: address.verify_tls(),
        timeout: address.timeout(),
    }
}
