// HTTP transport for the request engine.
//
// The Connector talks to the appliance only through the `Transport` trait so
// tests can substitute a scripted fake. `HttpTransport` is the reqwest-backed
// implementation: it keeps one client per (verify, timeout) pair and
// classifies reqwest failures into the engine's transport taxonomy.
//
// Clients are shared between targets, so cookies are not kept in the
// client: each Connector owns a `Jar` that is passed in per request.

use std::error::Error as StdError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::request::{BuiltRequest, HttpMethod};

pub use reqwest::cookie::Jar;

/// What went wrong at the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Certificate,
    ConnectTimeout,
    ReadTimeout,
    NameResolution,
    Connection,
    /// The appliance answered with a non-2xx status where a body was
    /// going to be saved.
    Status(u16),
    /// Local filesystem failure while saving a streamed body.
    Io,
}

/// Failure reported by a [`Transport`] implementation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    message: String,
    path: Option<PathBuf>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self {
            kind: TransportErrorKind::Io,
            message: source.to_string(),
            path: Some(path.to_path_buf()),
            source: Some(Box::new(source)),
        }
    }

    /// Classify a reqwest failure.
    ///
    /// Certificate and DNS failures are only distinguishable by the text of
    /// the underlying hyper/rustls errors, so the whole source chain is
    /// inspected.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let chain = error_chain(&err);
        let lowered = chain.to_lowercase();

        let kind = if lowered.contains("certificate") || lowered.contains("invalid peer") {
            TransportErrorKind::Certificate
        } else if err.is_timeout() && err.is_connect() {
            TransportErrorKind::ConnectTimeout
        } else if err.is_timeout() {
            TransportErrorKind::ReadTimeout
        } else if err.is_connect() && is_name_resolution(&lowered) {
            TransportErrorKind::NameResolution
        } else {
            TransportErrorKind::Connection
        };

        Self {
            kind,
            message: chain,
            path: None,
            source: Some(Box::new(err)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Recover the underlying IO error of an [`TransportErrorKind::Io`] failure.
    pub fn into_io_error(self) -> std::io::Error {
        match self.source.map(|s| s.downcast::<std::io::Error>()) {
            Some(Ok(io)) => *io,
            _ => std::io::Error::other(self.message),
        }
    }
}

fn is_name_resolution(message: &str) -> bool {
    [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "nodename nor servname",
        "temporary failure in name resolution",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        let text = source.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        current = source.source();
    }
    parts.join(": ")
}

/// A buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub text: String,
}

/// A response whose body was streamed to disk.
#[derive(Debug, Clone)]
pub struct SavedResponse {
    pub status: u16,
    pub path: PathBuf,
    pub bytes: u64,
}

/// The HTTP capability the Connector needs.
///
/// Implementations must honour the request's TLS-verification flag and
/// timeout, send the cookies `jar` holds for the request URL, and store
/// every `Set-Cookie` of the reply back into `jar`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &BuiltRequest,
        jar: &Jar,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;

    /// Stream the response body into `dest` without buffering it.
    ///
    /// A non-2xx reply fails with [`TransportErrorKind::Status`] before
    /// `dest` is created; a failure mid-stream removes the partial file.
    fn download(
        &self,
        request: &BuiltRequest,
        jar: &Jar,
        dest: &Path,
    ) -> impl Future<Output = Result<SavedResponse, TransportError>> + Send;
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Extra CA certificate (PEM) trusted by verifying clients.
    pub ca_cert: Option<PathBuf>,
}

impl TransportConfig {
    /// Build a `reqwest::Client` for one verify/timeout combination.
    ///
    /// The timeout bounds both the connect phase and each read, mirroring a
    /// browser-style per-phase timeout rather than a whole-request budget.
    pub fn build_client(
        &self,
        verify_tls: bool,
        timeout: Duration,
    ) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5));

        if verify_tls {
            if let Some(ref path) = self.ca_cert {
                let pem = std::fs::read(path).map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Certificate,
                        format!("failed to read CA cert {}: {e}", path.display()),
                    )
                })?;
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Certificate,
                        format!("invalid CA cert: {e}"),
                    )
                })?;
                builder = builder.add_root_certificate(cert);
            }
        } else {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Connection,
                format!("failed to build HTTP client: {e}"),
            )
        })
    }
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Default)]
pub struct HttpTransport {
    config: TransportConfig,
    clients: DashMap<(bool, Duration), reqwest::Client>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    fn client(&self, verify_tls: bool, timeout: Duration) -> Result<reqwest::Client, TransportError> {
        if let Some(client) = self.clients.get(&(verify_tls, timeout)) {
            return Ok(client.clone());
        }
        let client = self.config.build_client(verify_tls, timeout)?;
        self.clients.insert((verify_tls, timeout), client.clone());
        Ok(client)
    }

    fn prepare(
        &self,
        request: &BuiltRequest,
        jar: &Jar,
    ) -> Result<(reqwest::RequestBuilder, Url), TransportError> {
        let url = Url::parse(&request.url).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Connection,
                format!("invalid URL {}: {e}", request.url),
            )
        })?;
        let client = self.client(request.verify_tls, request.timeout)?;
        let mut builder = match request.method {
            HttpMethod::Get => client.get(url.clone()),
            HttpMethod::Post => client.post(url.clone()),
        };
        builder = builder.headers(header_map(request));
        if let Some(cookie) = jar.cookies(&url) {
            builder = builder.header(COOKIE, cookie);
        }
        if let (HttpMethod::Post, Some(body)) = (request.method, request.body.as_ref()) {
            builder = builder.body(body.clone());
        }
        Ok((builder, url))
    }
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &BuiltRequest,
        jar: &Jar,
    ) -> Result<RawResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let (builder, url) = self.prepare(request, jar)?;
        let resp = builder.send().await.map_err(TransportError::from_reqwest)?;

        let status = resp.status().as_u16();
        store_cookies(jar, resp.headers(), &url);
        let text = resp.text().await.map_err(TransportError::from_reqwest)?;

        trace!(status, bytes = text.len(), "response received");
        Ok(RawResponse { status, text })
    }

    async fn download(
        &self,
        request: &BuiltRequest,
        jar: &Jar,
        dest: &Path,
    ) -> Result<SavedResponse, TransportError> {
        debug!(url = %request.url, dest = %dest.display(), "streaming download");

        let (builder, url) = self.prepare(request, jar)?;
        let resp = builder.send().await.map_err(TransportError::from_reqwest)?;

        let status = resp.status();
        store_cookies(jar, resp.headers(), &url);
        if !status.is_success() {
            return Err(TransportError::new(
                TransportErrorKind::Status(status.as_u16()),
                format!("HTTP {status} from {url}"),
            ));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::io(dest, e))?;
        }

        match stream_to_file(resp, dest).await {
            Ok(bytes) => Ok(SavedResponse {
                status: status.as_u16(),
                path: dest.to_path_buf(),
                bytes,
            }),
            Err(e) => {
                if let Err(remove) = tokio::fs::remove_file(dest).await {
                    warn!(dest = %dest.display(), error = %remove, "could not remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file(resp: reqwest::Response, dest: &Path) -> Result<u64, TransportError> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| TransportError::io(dest, e))?;

    let mut stream = resp.bytes_stream();
    let mut bytes = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::from_reqwest)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| TransportError::io(dest, e))?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| TransportError::io(dest, e))?;
    Ok(bytes)
}

fn header_map(request: &BuiltRequest) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "skipping header that is not valid HTTP"),
        }
    }
    map
}

/// Store every `Set-Cookie` of a reply in `jar`, scoped to `url`.
///
/// Expired cookies (`Max-Age=0`, a past `Expires`) evict the stored one.
pub fn store_cookies(jar: &Jar, headers: &HeaderMap, url: &Url) {
    jar.set_cookies(&mut headers.get_all(SET_COOKIE).iter(), url);
}

/// The `Cookie` header `jar` would send to `url`.
pub fn cookie_header(jar: &Jar, url: &Url) -> Option<String> {
    let cookies = jar.cookies(url)?;
    cookies.to_str().ok().map(String::from)
}
