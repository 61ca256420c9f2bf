//! Trace codes stamped on every [`SfosResponse`](crate::SfosResponse).
//!
//! Each code names the code path that produced a response so logs and
//! reports can be correlated without matching on error text.

pub const LOGIN_OK: &str = "LOGIN_OK";
pub const LOGIN_NO_CREDENTIALS: &str = "LOGIN_NO_CREDENTIALS";
pub const LOGIN_TRANSPORT_ERROR: &str = "LOGIN_TRANSPORT_ERROR";
pub const LOGIN_REJECTED: &str = "LOGIN_REJECTED";
pub const LOGIN_PARSE_ERROR: &str = "LOGIN_PARSE_ERROR";

pub const INFO_CACHED: &str = "INFO_CACHED";
pub const INFO_AFTER_LOGIN: &str = "INFO_AFTER_LOGIN";

pub const SEND_OK: &str = "SEND_OK";
pub const SEND_HTTP_STATUS: &str = "SEND_HTTP_STATUS";
pub const SEND_AUTH_FAILED: &str = "SEND_AUTH_FAILED";
pub const SEND_TRANSPORT_ERROR: &str = "SEND_TRANSPORT_ERROR";

pub const DOWNLOAD_OK: &str = "DOWNLOAD_OK";
pub const DOWNLOAD_AUTH_FAILED: &str = "DOWNLOAD_AUTH_FAILED";
pub const DOWNLOAD_ERROR: &str = "DOWNLOAD_ERROR";

pub const SCRIPT_UNRESOLVED: &str = "SCRIPT_UNRESOLVED";
