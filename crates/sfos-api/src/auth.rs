// Web admin login material.
//
// The console authenticates with a form POST whose `json=` field carries the
// credentials as compact JSON. The reply body is not a status document but a
// fixed redirection snippet, so success and failure are recognised by
// substring markers.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::Error;

/// Header carrying the session's CSRF token on authenticated calls.
pub const CSRF_HEADER: &str = "X-Csrf-Token";

pub(crate) const AUTH_SUCCESS_MARKER: &str =
    r#"{"redirectionURL":"/webpages/index.jsp","status":200}"#;
pub(crate) const AUTH_FAILURE_MARKER: &str =
    r#"{"redirectionURL":"/webpages/login.jsp","status":-1}"#;
pub(crate) const AUTH_DISCLAIMER_MARKER: &str = r#""disclaimer_message":""#;

/// Username/password (and optional captcha answer) for one appliance.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
    captcha: Option<SecretString>,
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
    languageid: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    captcha: Option<&'a str>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            captcha: None,
        }
    }

    /// Answer to a captcha challenge. Must be sent on the session that
    /// received the challenge; see [`crate::Connector::resume_session`].
    pub fn with_captcha(mut self, captcha: impl Into<String>) -> Self {
        self.captcha = Some(SecretString::from(captcha.into()));
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn has_captcha(&self) -> bool {
        self.captcha.is_some()
    }

    /// `{"username":..,"password":..,"languageid":"1"[,"captcha":..]}`
    pub(crate) fn login_payload(&self) -> Result<String, Error> {
        let payload = LoginPayload {
            username: &self.username,
            password: self.password.expose_secret(),
            languageid: "1",
            captcha: self.captcha.as_ref().map(ExposeSecret::expose_secret),
        };
        serde_json::to_string(&payload).map_err(|e| Error::Login {
            message: format!("unable to encode credentials: {e}"),
        })
    }
}

/// Why the credential submission was not accepted.
pub(crate) fn check_login_reply(body: &str) -> Result<(), Error> {
    let message = if body.contains(AUTH_FAILURE_MARKER) {
        "Check username or password are correct"
    } else if body.contains(AUTH_DISCLAIMER_MARKER) {
        "Disclaimer Message Enabled"
    } else if !body.contains(AUTH_SUCCESS_MARKER) {
        "Unexpected response"
    } else {
        return Ok(());
    };
    Err(Error::Login {
        message: message.to_owned(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_compact_and_ordered() {
        let creds = Credentials::new("admin", "s3cret");
        assert_eq!(
            creds.login_payload().unwrap(),
            r#"{"username":"admin","password":"s3cret","languageid":"1"}"#
        );

        let creds = creds.with_captcha("x7k2");
        assert_eq!(
            creds.login_payload().unwrap(),
            r#"{"username":"admin","password":"s3cret","languageid":"1","captcha":"x7k2"}"#
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let creds = Credentials::new("admin", "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn reply_markers() {
        assert!(check_login_reply(AUTH_SUCCESS_MARKER).is_ok());

        let err = check_login_reply(AUTH_FAILURE_MARKER).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authentication failed - Check username or password are correct"
        );

        let err = check_login_reply(r#"{"disclaimer_message":"Be nice"}"#).unwrap_err();
        assert!(err.to_string().contains("Disclaimer"));

        let err = check_login_reply("<html>maintenance</html>").unwrap_err();
        assert!(err.to_string().contains("Unexpected response"));
    }
}
