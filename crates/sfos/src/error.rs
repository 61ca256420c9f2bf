//! CLI error types with miette diagnostics.
//!
//! Maps engine and configuration errors into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use sfos_api::{Error as ApiError, SfosResponse};
use sfos_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {target}")]
    #[diagnostic(
        code(sfos::connection_failed),
        help(
            "Check that the firewall is reachable and the web admin port is open.\n\
             Detail: {message}"
        )
    )]
    ConnectionFailed { target: String, message: String },

    #[error("TLS certificate verification failed for {target}")]
    #[diagnostic(
        code(sfos::tls_error),
        help(
            "The firewall is using a self-signed certificate.\n\
             Use --insecure (-k) to accept it, or set defaults.ca_cert in the config file."
        )
    )]
    TlsError { target: String },

    #[error("Request to {target} timed out after {seconds}s")]
    #[diagnostic(
        code(sfos::timeout),
        help("Increase timeout with --timeout or check the firewall's responsiveness.")
    )]
    Timeout { target: String, seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed for {target}: {message}")]
    #[diagnostic(
        code(sfos::auth_failed),
        help(
            "Verify the username and password.\n\
             A disclaimer or captcha on the login page must be cleared in a browser first."
        )
    )]
    AuthFailed { target: String, message: String },

    #[error("No credentials configured for '{target}'")]
    #[diagnostic(
        code(sfos::no_credentials),
        help(
            "Pass --password, set FW_PASSWORD, or store one in the keyring under\n\
             service 'sfos', user '{target}/password'."
        )
    )]
    NoCredentials { target: String },

    // ── Templates ────────────────────────────────────────────────────

    #[error("Command '{name}' not found")]
    #[diagnostic(
        code(sfos::command_not_found),
        help("Searched: {searched}\nRun: sfos templates to see available commands")
    )]
    CommandNotFound { name: String, searched: String },

    #[error("Request object not found: {expected}")]
    #[diagnostic(code(sfos::object_not_found))]
    ObjectNotFound { expected: String },

    // ── Request ──────────────────────────────────────────────────────

    #[error("Request to {target} failed: {message}")]
    #[diagnostic(code(sfos::request_failed))]
    RequestFailed { target: String, message: String },

    #[error(transparent)]
    #[diagnostic(code(sfos::engine))]
    Engine(ApiError),

    // ── Targets & configuration ──────────────────────────────────────

    #[error("No firewall to talk to")]
    #[diagnostic(
        code(sfos::no_targets),
        help(
            "Pass --hostname, --target NAME, or --inventory FILE.\n\
             Config file: {path}"
        )
    )]
    NoTargets { path: String },

    #[error("Target '{name}' not found in configuration")]
    #[diagnostic(code(sfos::target_not_found), help("Available targets: {available}"))]
    TargetNotFound { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sfos::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(sfos::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not write {path}")]
    #[diagnostic(code(sfos::write_failed))]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(sfos::json), help("Check the --data value and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::CommandNotFound { .. }
            | Self::ObjectNotFound { .. }
            | Self::TargetNotFound { .. } => exit_code::NOT_FOUND,
            Self::NoTargets { .. } | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// The error a failed response stands for, if it failed.
    pub fn from_response(response: &SfosResponse) -> Option<Self> {
        if response.success() {
            return None;
        }
        let target = response.target().to_owned();
        Some(match response.error() {
            Some(error) => Self::from_engine(error, target),
            None => Self::RequestFailed {
                target,
                message: response
                    .status_code()
                    .map_or_else(|| "no response".into(), |s| format!("HTTP {s}")),
            },
        })
    }

    fn from_engine(error: &ApiError, target: String) -> Self {
        match error {
            ApiError::Certificate { .. } => Self::TlsError { target },
            ApiError::ConnectionTimeout { timeout_secs, .. }
            | ApiError::ReadTimeout { timeout_secs, .. } => Self::Timeout {
                target,
                seconds: *timeout_secs,
            },
            ApiError::NameResolution { message, .. } | ApiError::AgentConnection { message, .. } => {
                Self::ConnectionFailed {
                    target,
                    message: message.clone(),
                }
            }
            ApiError::Login { message } => Self::AuthFailed {
                target,
                message: message.clone(),
            },
            ApiError::DefinitionNotFound { name, searched } => Self::CommandNotFound {
                name: name.clone(),
                searched: join_paths(searched),
            },
            ApiError::NoMatchFound { expected } => Self::ObjectNotFound {
                expected: expected.clone(),
            },
            other => Self::RequestFailed {
                target,
                message: other.to_string(),
            },
        }
    }
}

// ── Engine errors raised before any target is contacted ──────────────

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::DefinitionNotFound { .. } | ApiError::NoMatchFound { .. } => {
                Self::from_engine(&err, String::new())
            }
            other => Self::Engine(other),
        }
    }
}

fn join_paths(paths: &[std::path::PathBuf]) -> String {
    if paths.is_empty() {
        return "built-in templates only".into();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { target } => Self::NoCredentials { target },
            ConfigError::UnknownTarget { name, available } => Self::TargetNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
