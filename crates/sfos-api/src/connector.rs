// Connector: one appliance, one session.
//
// Owns the session state (cookies, CSRF token, cached device info) for a
// single target and drives the login handshake. Every method takes
// `&mut self`: a Connector is used sequentially by one task, and distinct
// targets get distinct Connectors that may run concurrently.
//
// Transport and parser failures never escape as `Err`; they come back as a
// failed `SfosResponse` so batch callers can keep going.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::auth::{CSRF_HEADER, Credentials, check_login_reply};
use crate::device_info::DeviceInfo;
use crate::error::Error;
use crate::parser::IndexParser;
use crate::request::{BuiltRequest, build};
use crate::response::SfosResponse;
use crate::template::{ADMIN_LOGIN, TemplateRegistry};
use crate::trace;
use crate::transport::{
    HttpTransport, Jar, RawResponse, Transport, TransportConfig, cookie_header,
};

/// Where a Connector is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Default)]
struct SessionState {
    jar: Jar,
    csrf_token: Option<String>,
    authenticating: bool,
    info: Option<DeviceInfo>,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        if self.authenticating {
            SessionPhase::Authenticating
        } else if self.csrf_token.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }
}

/// Session-authenticated client for one firewall's web admin console.
#[derive(Debug)]
pub struct Connector<T: Transport = HttpTransport> {
    address: Address,
    credentials: Option<Credentials>,
    transport: Arc<T>,
    templates: Arc<TemplateRegistry>,
    parser: IndexParser,
    state: SessionState,
}

impl Connector<HttpTransport> {
    /// Connector with its own HTTP transport and the built-in templates.
    pub fn new(address: Address, credentials: Option<Credentials>) -> Self {
        Self::with_transport(
            address,
            credentials,
            Arc::new(HttpTransport::new(TransportConfig::default())),
            Arc::new(TemplateRegistry::builtin()),
        )
    }
}

impl<T: Transport> Connector<T> {
    /// Connector over a shared transport and template registry.
    pub fn with_transport(
        address: Address,
        credentials: Option<Credentials>,
        transport: Arc<T>,
        templates: Arc<TemplateRegistry>,
    ) -> Self {
        Self {
            address,
            credentials,
            transport,
            templates,
            parser: IndexParser::default(),
            state: SessionState::default(),
        }
    }

    /// Use a parser expecting a different token variable name.
    pub fn with_parser(mut self, parser: IndexParser) -> Self {
        self.parser = parser;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.phase() == SessionPhase::Authenticated
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.state.csrf_token.as_deref()
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.state.info.as_ref()
    }

    /// The `Cookie` header the session currently sends to the controller.
    pub fn cookie_header(&self) -> Option<String> {
        let url = Url::parse(&self.address.controller_url()).ok()?;
        cookie_header(&self.state.jar, &url)
    }

    /// Seed the session with cookies from an earlier exchange, e.g. the
    /// `JSESSIONID` that received a captcha challenge.
    pub fn resume_session<I, K, V>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let Ok(url) = Url::parse(&self.address.base_url()) else {
            warn!(host = %self.address, "cannot resume session on an invalid URL");
            return;
        };
        for (name, value) in cookies {
            let (name, value) = (name.as_ref(), value.as_ref());
            debug!(host = %self.address, cookie = name, "resuming session cookie");
            self.state
                .jar
                .add_cookie_str(&format!("{name}={value}; Path=/"), &url);
        }
    }

    fn target(&self) -> String {
        self.address.authority()
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Authenticate and scrape the landing page.
    ///
    /// `credentials`, when given, replace the stored ones. On success the
    /// response carries the [`DeviceInfo`]; on any failure the session
    /// stays unauthenticated with no token.
    pub async fn login(&mut self, credentials: Option<Credentials>) -> SfosResponse {
        let started = Instant::now();
        if let Some(credentials) = credentials {
            self.credentials = Some(credentials);
        }

        self.state.csrf_token = None;
        self.state.info = None;

        let Some(credentials) = self.credentials.clone() else {
            return SfosResponse::failure(
                &self.target(),
                trace::LOGIN_NO_CREDENTIALS,
                Error::Login {
                    message: "Credentials not provided".into(),
                },
                started.elapsed(),
            );
        };

        self.state.authenticating = true;
        let outcome = self.handshake(&credentials).await;
        self.state.authenticating = false;

        match outcome {
            Ok((info, status)) => {
                info!(
                    host = %self.address,
                    user = credentials.username(),
                    model = %info.model,
                    elapsed_ms = elapsed_ms(started),
                    "login succeeded"
                );
                self.state.csrf_token = Some(info.csrf_token.clone());
                self.state.info = Some(info.clone());
                SfosResponse::from_info(
                    &self.target(),
                    trace::LOGIN_OK,
                    info,
                    Some(status),
                    started.elapsed(),
                )
            }
            Err((code, error)) => {
                warn!(host = %self.address, trace = code, error = %error, "login failed");
                SfosResponse::failure(&self.target(), code, error, started.elapsed())
            }
        }
    }

    /// Submit credentials, fetch the landing page, then judge both.
    async fn handshake(
        &mut self,
        credentials: &Credentials,
    ) -> Result<(DeviceInfo, u16), (&'static str, Error)> {
        let rejected = |e: Error| (trace::LOGIN_REJECTED, e);

        let steps = self.templates.load(ADMIN_LOGIN).map_err(rejected)?;
        let [submit, landing] = steps.definitions() else {
            return Err(rejected(Error::Template {
                name: ADMIN_LOGIN.into(),
                message: format!("expected 2 steps, found {}", steps.len()),
            }));
        };

        debug!(
            host = %self.address,
            user = credentials.username(),
            captcha = credentials.has_captcha(),
            "submitting credentials"
        );
        let payload = credentials.login_payload().map_err(rejected)?;
        let submit = build(submit, &self.address, Some(payload.as_str()));
        let landing = build(landing, &self.address, None);

        let transport_error = |e: Error| (trace::LOGIN_TRANSPORT_ERROR, e);
        let auth_reply = self.dispatch(&submit).await.map_err(transport_error)?;
        let landing_reply = self.dispatch(&landing).await.map_err(transport_error)?;

        check_login_reply(&auth_reply.text).map_err(rejected)?;

        let info = self.parser.parse(&landing_reply.text).map_err(|e| {
            (
                trace::LOGIN_PARSE_ERROR,
                Error::Login {
                    message: e.to_string(),
                },
            )
        })?;
        Ok((info, landing_reply.status))
    }

    /// Log in unless a token is held or a login is already under way.
    pub async fn ensure_authenticated(&mut self) -> Result<(), Error> {
        if self.state.csrf_token.is_some() || self.state.authenticating {
            return Ok(());
        }
        debug!(host = %self.address, "session not authenticated, logging in");
        let response = self.login(None).await;
        if response.success() {
            return Ok(());
        }
        Err(response.into_error().unwrap_or_else(|| Error::Login {
            message: "Unexpected response".into(),
        }))
    }

    /// Device information, logging in first if needed.
    pub async fn get_info(&mut self) -> SfosResponse {
        let started = Instant::now();
        if let (Some(_), Some(info)) = (&self.state.csrf_token, &self.state.info) {
            return SfosResponse::from_info(
                &self.target(),
                trace::INFO_CACHED,
                info.clone(),
                None,
                started.elapsed(),
            );
        }

        let response = self.login(None).await;
        let info = response.device_info().cloned();
        match info {
            Some(info) if response.success() => SfosResponse::from_info(
                &self.target(),
                trace::INFO_AFTER_LOGIN,
                info,
                response.status_code(),
                started.elapsed(),
            ),
            _ => response,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Send with the session's cookies and token; the jar keeps new cookies.
    async fn dispatch(&mut self, request: &BuiltRequest) -> Result<RawResponse, Error> {
        let request = match &self.state.csrf_token {
            Some(token) => request.with_header(CSRF_HEADER, token),
            None => request.clone(),
        };

        self.transport
            .send(&request, &self.state.jar)
            .await
            .map_err(|e| Error::from_transport(e, &self.target(), timeout_secs(request.timeout)))
    }

    /// Send one request on the authenticated session.
    pub async fn send_request(&mut self, request: &BuiltRequest) -> SfosResponse {
        let started = Instant::now();
        if let Err(error) = self.ensure_authenticated().await {
            return SfosResponse::failure(
                &self.target(),
                trace::SEND_AUTH_FAILED,
                error,
                started.elapsed(),
            );
        }

        let outcome = self.dispatch(request).await;
        match outcome {
            Ok(reply) => {
                debug!(
                    host = %self.address,
                    status = reply.status,
                    elapsed_ms = elapsed_ms(started),
                    "request complete"
                );
                let code = if (200..300).contains(&reply.status) {
                    trace::SEND_OK
                } else {
                    trace::SEND_HTTP_STATUS
                };
                SfosResponse::from_http(
                    &self.target(),
                    code,
                    reply.status,
                    reply.text,
                    started.elapsed(),
                )
            }
            Err(error) => {
                warn!(host = %self.address, error = %error, "request failed");
                SfosResponse::failure(
                    &self.target(),
                    trace::SEND_TRANSPORT_ERROR,
                    error,
                    started.elapsed(),
                )
            }
        }
    }

    /// Stream a response body to `dest` instead of buffering it.
    ///
    /// A non-2xx reply fails with [`Error::HttpStatus`] and leaves no file.
    pub async fn download(&mut self, request: &BuiltRequest, dest: &Path) -> SfosResponse {
        let started = Instant::now();
        if let Err(error) = self.ensure_authenticated().await {
            return SfosResponse::failure(
                &self.target(),
                trace::DOWNLOAD_AUTH_FAILED,
                error,
                started.elapsed(),
            );
        }

        let request = match &self.state.csrf_token {
            Some(token) => request.with_header(CSRF_HEADER, token),
            None => request.clone(),
        };

        let outcome = self
            .transport
            .download(&request, &self.state.jar, dest)
            .await;
        match outcome {
            Ok(saved) => {
                info!(
                    host = %self.address,
                    path = %saved.path.display(),
                    bytes = saved.bytes,
                    "download saved"
                );
                SfosResponse::saved(
                    &self.target(),
                    trace::DOWNLOAD_OK,
                    saved.status,
                    saved.path,
                    saved.bytes,
                    started.elapsed(),
                )
            }
            Err(e) => {
                let error = Error::from_transport(e, &self.target(), timeout_secs(request.timeout));
                warn!(host = %self.address, error = %error, "download failed");
                let status = match &error {
                    Error::HttpStatus { status, .. } => Some(*status),
                    _ => None,
                };
                SfosResponse::failure(&self.target(), trace::DOWNLOAD_ERROR, error, started.elapsed())
                    .with_status(status)
            }
        }
    }
}

fn timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
