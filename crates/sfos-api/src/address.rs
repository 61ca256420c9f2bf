use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controller endpoint for all AJAX operations.
pub const PATH_CONTROLLER: &str = "webconsole/Controller";
/// Authenticated landing page carrying the CSRF token.
pub const PATH_INDEX_JSP: &str = "webconsole/webpages/index.jsp";
/// Login form page.
pub const PATH_LOGIN_JSP: &str = "webconsole/webpages/login.jsp";

pub const DEFAULT_PORT: u16 = 4444;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// URL scheme used to reach the web admin console.
///
/// Appliances always serve HTTPS; plain HTTP exists for TLS-terminating
/// proxies and local fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Http => "http",
        }
    }
}

/// Where a firewall's web admin console lives and how to talk to it.
///
/// Immutable once built; every URL the engine uses is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    hostname: String,
    port: u16,
    verify_tls: bool,
    timeout: Duration,
    scheme: Scheme,
}

impl Address {
    /// Address on the default admin port, verifying TLS, 10 s timeout.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            verify_tls: true,
            timeout: DEFAULT_TIMEOUT,
            scheme: Scheme::Https,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// `{hostname}:{port}`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// `https://{hostname}:{port}/`
    pub fn base_url(&self) -> String {
        format!("{}://{}/", self.scheme.as_str(), self.authority())
    }

    pub fn controller_url(&self) -> String {
        format!("{}{PATH_CONTROLLER}", self.base_url())
    }

    pub fn index_url(&self) -> String {
        format!("{}{PATH_INDEX_JSP}", self.base_url())
    }

    pub fn login_url(&self) -> String {
        format!("{}{PATH_LOGIN_JSP}", self.base_url())
    }

    /// Absolute URL for a template path.
    ///
    /// Expands `{PATH_CONTROLLER}`, `{PATH_INDEX_JSP}` and `{PATH_LOGIN_JSP}`
    /// and drops a leading `/`. An empty path yields the base URL.
    pub fn url(&self, path: &str) -> String {
        let path = path
            .replace("{PATH_CONTROLLER}", PATH_CONTROLLER)
            .replace("{PATH_INDEX_JSP}", PATH_INDEX_JSP)
            .replace("{PATH_LOGIN_JSP}", PATH_LOGIN_JSP);
        format!("{}{}", self.base_url(), path.trim_start_matches('/'))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}
