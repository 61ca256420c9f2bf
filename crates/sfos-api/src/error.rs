use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::transport::{TransportError, TransportErrorKind};

/// Top-level error type for the `sfos-api` crate.
///
/// Covers every failure mode of the request engine: transport faults,
/// authentication, landing-page parsing, template resolution, and script
/// loading. Connection-level variants carry the target they were raised
/// against so batch callers can report them without string matching.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// TLS verification of the appliance certificate failed.
    #[error("Unable to verify certificate for {target}: {message}")]
    Certificate { target: String, message: String },

    /// The TCP/TLS connect phase did not complete in time.
    #[error("Connection to {target} timed out after {timeout_secs}s")]
    ConnectionTimeout { target: String, timeout_secs: u64 },

    /// Connected, but the appliance stopped answering mid-response.
    #[error("Read from {target} timed out after {timeout_secs}s")]
    ReadTimeout { target: String, timeout_secs: u64 },

    /// The hostname could not be resolved.
    #[error("Unable to resolve {target}: {message}")]
    NameResolution { target: String, message: String },

    /// Any other transport-level connection failure.
    #[error("Connection to {target} failed: {message}")]
    AgentConnection { target: String, message: String },

    /// The appliance answered a download with a non-2xx status.
    #[error("{target} answered HTTP {status}")]
    HttpStatus { target: String, status: u16 },

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected or the landing page could not be parsed.
    #[error("Authentication failed - {message}")]
    Login { message: String },

    // ── Landing page parsing ────────────────────────────────────────
    /// No inline script blocks were found in the landing page.
    #[error("No relevant data found in landing page: {message}")]
    Processor { message: String },

    /// A required pattern or named item was not found.
    #[error("No match found: {expected}")]
    NoMatchFound { expected: String },

    /// No `Namespace.key = 'value';` assignments were found.
    #[error("Unable to parse key/value pairs: {message}")]
    KeyParsing { message: String },

    /// Parsing completed but required device fields are absent.
    #[error("Missing keys {}", missing.join(", "))]
    KeyMissing { missing: Vec<String> },

    // ── Templates & scripts ─────────────────────────────────────────
    /// No template with this command name exists in any search path.
    #[error("Definition not found: {name}")]
    DefinitionNotFound { name: String, searched: Vec<PathBuf> },

    /// A template file exists but could not be decoded.
    #[error("Invalid template '{name}': {message}")]
    Template { name: String, message: String },

    /// A script file could not be read or decoded.
    #[error("Invalid script {}: {message}", path.display())]
    Script { path: PathBuf, message: String },

    // ── Local IO ────────────────────────────────────────────────────
    /// Writing a downloaded body to disk failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Flat classification of [`Error`] for log correlation and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
pub enum ErrorKind {
    CertificateError,
    ConnectionTimeoutError,
    ReadTimeoutError,
    NameResolutionError,
    AgentConnectionError,
    HttpStatusError,
    LoginError,
    ProcessorError,
    NoMatchFound,
    KeyParsingError,
    KeyMissingError,
    DefinitionNotFound,
    TemplateError,
    ScriptError,
    IoError,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Certificate { .. } => ErrorKind::CertificateError,
            Self::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeoutError,
            Self::ReadTimeout { .. } => ErrorKind::ReadTimeoutError,
            Self::NameResolution { .. } => ErrorKind::NameResolutionError,
            Self::AgentConnection { .. } => ErrorKind::AgentConnectionError,
            Self::HttpStatus { .. } => ErrorKind::HttpStatusError,
            Self::Login { .. } => ErrorKind::LoginError,
            Self::Processor { .. } => ErrorKind::ProcessorError,
            Self::NoMatchFound { .. } => ErrorKind::NoMatchFound,
            Self::KeyParsing { .. } => ErrorKind::KeyParsingError,
            Self::KeyMissing { .. } => ErrorKind::KeyMissingError,
            Self::DefinitionNotFound { .. } => ErrorKind::DefinitionNotFound,
            Self::Template { .. } => ErrorKind::TemplateError,
            Self::Script { .. } => ErrorKind::ScriptError,
            Self::Io { .. } => ErrorKind::IoError,
        }
    }

    /// Returns `true` for failures raised while talking to the appliance.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Certificate { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ReadTimeout { .. }
                | Self::NameResolution { .. }
                | Self::AgentConnection { .. }
        )
    }

    /// Returns `true` for landing-page parser failures.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Self::Processor { .. }
                | Self::NoMatchFound { .. }
                | Self::KeyParsing { .. }
                | Self::KeyMissing { .. }
        )
    }

    /// Attach a target to a transport failure.
    pub(crate) fn from_transport(err: TransportError, target: &str, timeout_secs: u64) -> Self {
        let target = target.to_owned();
        let message = err.to_string();
        match err.kind {
            TransportErrorKind::Io => Self::Io {
                path: err.path().map(PathBuf::from).unwrap_or_default(),
                source: err.into_io_error(),
            },
            TransportErrorKind::Certificate => Self::Certificate { target, message },
            TransportErrorKind::ConnectTimeout => Self::ConnectionTimeout {
                target,
                timeout_secs,
            },
            TransportErrorKind::ReadTimeout => Self::ReadTimeout {
                target,
                timeout_secs,
            },
            TransportErrorKind::NameResolution => Self::NameResolution { target, message },
            TransportErrorKind::Connection => Self::AgentConnection { target, message },
            TransportErrorKind::Status(status) => Self::HttpStatus { target, status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_listed_in_message() {
        let err = Error::KeyMissing {
            missing: vec!["companyName".into(), "version".into()],
        };
        assert_eq!(err.to_string(), "Missing keys companyName, version");
        assert_eq!(err.kind(), ErrorKind::KeyMissingError);
        assert!(err.is_parse());
    }

    #[test]
    fn transport_kinds_map_to_taxonomy() {
        let err = Error::from_transport(
            TransportError::new(TransportErrorKind::NameResolution, "dns error"),
            "badhost:4444",
            10,
        );
        assert_eq!(err.kind(), ErrorKind::NameResolutionError);
        assert!(err.is_connection());

        let err = Error::from_transport(
            TransportError::new(TransportErrorKind::ConnectTimeout, "timed out"),
            "10.98.76.54:4444",
            1,
        );
        assert!(matches!(
            err,
            Error::ConnectionTimeout {
                timeout_secs: 1,
                ..
            }
        ));
    }

    #[test]
    fn kind_renders_as_taxonomy_name() {
        assert_eq!(ErrorKind::LoginError.to_string(), "LoginError");
        let name: &'static str = ErrorKind::AgentConnectionError.into();
        assert_eq!(name, "AgentConnectionError");
    }
}
