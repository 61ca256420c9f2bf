use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::device_info::DeviceInfo;
use crate::error::{Error, ErrorKind};

/// Structured payload of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Device identity from a login or info call.
    Device(Box<DeviceInfo>),
    /// A body that decoded as JSON.
    Json(Value),
    /// A body streamed to disk.
    Saved { path: PathBuf, bytes: u64 },
}

/// Outcome of one engine call against one target.
///
/// Either `error` is set and `success` is `false`, or the response carries
/// `text` and/or `data`. Immutable once built.
#[derive(Debug, Serialize)]
pub struct SfosResponse {
    success: bool,
    target: String,
    status_code: Option<u16>,
    timestamp: DateTime<Utc>,
    trace: &'static str,
    #[serde(serialize_with = "millis")]
    timer_ms: Duration,
    text: Option<String>,
    data: Option<ResponseData>,
    #[serde(serialize_with = "error_text")]
    error: Option<Error>,
    error_kind: Option<ErrorKind>,
}

fn millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

#[allow(clippy::ref_option)]
fn error_text<S: Serializer>(error: &Option<Error>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl SfosResponse {
    fn base(target: &str, trace: &'static str, elapsed: Duration) -> Self {
        Self {
            success: false,
            target: target.to_owned(),
            status_code: None,
            timestamp: Utc::now(),
            trace,
            timer_ms: elapsed,
            text: None,
            data: None,
            error: None,
            error_kind: None,
        }
    }

    /// An HTTP reply. Success follows the status class; JSON bodies are
    /// also decoded into `data`.
    pub fn from_http(
        target: &str,
        trace: &'static str,
        status: u16,
        text: String,
        elapsed: Duration,
    ) -> Self {
        let data = serde_json::from_str::<Value>(&text).ok().map(ResponseData::Json);
        Self {
            success: (200..300).contains(&status),
            status_code: Some(status),
            text: Some(text),
            data,
            ..Self::base(target, trace, elapsed)
        }
    }

    /// Device information, from a fresh login or the session cache.
    pub fn from_info(
        target: &str,
        trace: &'static str,
        info: DeviceInfo,
        status: Option<u16>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            status_code: status,
            data: Some(ResponseData::Device(Box::new(info))),
            ..Self::base(target, trace, elapsed)
        }
    }

    /// A body saved to `path`.
    pub fn saved(
        target: &str,
        trace: &'static str,
        status: u16,
        path: PathBuf,
        bytes: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: (200..300).contains(&status),
            status_code: Some(status),
            text: Some(path.display().to_string()),
            data: Some(ResponseData::Saved { path, bytes }),
            ..Self::base(target, trace, elapsed)
        }
    }

    pub fn failure(target: &str, trace: &'static str, error: Error, elapsed: Duration) -> Self {
        Self {
            error_kind: Some(error.kind()),
            error: Some(error),
            ..Self::base(target, trace, elapsed)
        }
    }

    /// Record the HTTP status of a reply that was still judged a failure.
    pub(crate) fn with_status(mut self, status: Option<u16>) -> Self {
        self.status_code = status;
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// `host:port` of the appliance.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn trace(&self) -> &'static str {
        self.trace
    }

    pub fn elapsed(&self) -> Duration {
        self.timer_ms
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn data(&self) -> Option<&ResponseData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Device information carried by this response, if any.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        match self.data.as_ref()? {
            ResponseData::Device(info) => Some(info),
            _ => None,
        }
    }

    /// Take the error out, e.g. to propagate it with `?`.
    pub fn into_error(self) -> Option<Error> {
        self.error
    }
}
