#![allow(clippy::unwrap_used)]
// Integration tests for `Connector` using wiremock as the appliance.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sfos_api::{
    Address, Connector, Credentials, ErrorKind, HttpTransport, ResponseData, Scheme,
    SessionPhase, TemplateRegistry, TransportConfig, request, trace,
};

const LANDING_PAGE: &str = include_str!("fixtures/index.jsp.html");
const TOKEN: &str = "tok123abc";
const AUTH_OK: &str = r#"{"redirectionURL":"/webpages/index.jsp","status":200}"#;
const AUTH_FAIL: &str = r#"{"redirectionURL":"/webpages/login.jsp","status":-1}"#;

// ── Helpers ─────────────────────────────────────────────────────────

fn address_for(server: &MockServer) -> Address {
    Address::new("127.0.0.1")
        .with_port(server.address().port())
        .with_scheme(Scheme::Http)
}

async fn setup(credentials: Option<Credentials>) -> (MockServer, Connector) {
    let server = MockServer::start().await;
    let connector = Connector::with_transport(
        address_for(&server),
        credentials,
        Arc::new(HttpTransport::new(TransportConfig::default())),
        Arc::new(TemplateRegistry::builtin()),
    );
    (server, connector)
}

fn admin() -> Option<Credentials> {
    Some(Credentials::new("admin", "s3cret"))
}

async fn mount_login(server: &MockServer, auth_body: &str, landing: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=151"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "JSESSIONID=sess42; Path=/; HttpOnly")
                .set_body_string(auth_body),
        )
        .expect(expected)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/webconsole/webpages/index.jsp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing))
        .expect(expected)
        .mount(server)
        .await;
}

fn heartbeat(connector: &Connector) -> sfos_api::BuiltRequest {
    let set = connector.templates().load("HEARTBEAT_STATUS").unwrap();
    request::build(&set.definitions()[0], connector.address(), None)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    let response = connector.login(None).await;

    assert!(response.success(), "login failed: {:?}", response.error());
    assert_eq!(response.trace(), trace::LOGIN_OK);
    let info = response.device_info().unwrap();
    assert_eq!(info.model, "XGS2100");
    assert_eq!(info.serial_number, "X21000ABCDEF12");
    assert_eq!(info.subscriptions().len(), 2);
    assert_eq!(connector.csrf_token(), Some(TOKEN));
    assert_eq!(connector.phase(), SessionPhase::Authenticated);
    assert_eq!(connector.cookie_header().as_deref(), Some("JSESSIONID=sess42"));
}

#[tokio::test]
async fn test_login_sends_compact_credentials() {
    let (server, mut connector) = setup(admin()).await;

    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=151&json=%7B%22username%22%3A%22admin%22"))
        .and(body_string_contains("__RequestType=ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AUTH_OK))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/webconsole/webpages/index.jsp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(&server)
        .await;

    assert!(connector.login(None).await.success());
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_FAIL, LANDING_PAGE, 1).await;

    let response = connector.login(None).await;

    assert!(!response.success());
    assert_eq!(response.error_kind(), Some(ErrorKind::LoginError));
    assert_eq!(response.trace(), trace::LOGIN_REJECTED);
    assert!(response.error().unwrap().to_string().contains("username or password"));
    assert_eq!(connector.csrf_token(), None);
    assert_eq!(connector.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn test_login_blocked_by_disclaimer() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(
        &server,
        r#"{"disclaimer_message":"Authorised use only","status":200}"#,
        LANDING_PAGE,
        1,
    )
    .await;

    let response = connector.login(None).await;

    assert!(!response.success());
    assert!(response.error().unwrap().to_string().contains("Disclaimer"));
    assert!(!connector.is_authenticated());
}

#[tokio::test]
async fn test_login_unparseable_landing_page() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, "<html><body>maintenance</body></html>", 1).await;

    let response = connector.login(None).await;

    assert_eq!(response.error_kind(), Some(ErrorKind::LoginError));
    assert_eq!(response.trace(), trace::LOGIN_PARSE_ERROR);
    assert_eq!(connector.csrf_token(), None);
}

#[tokio::test]
async fn test_login_with_renamed_token_variable() {
    let (server, mut connector) = setup(admin()).await;
    let page = LANDING_PAGE
        .replace("Cyberoam.c$rFt0k3n = 'tok123abc';", "Cyberoam.x9Tk = 'tok987zz';")
        .replace("setCSRFToken(Cyberoam.c$rFt0k3n)", "setCSRFToken(Cyberoam.x9Tk)");
    mount_login(&server, AUTH_OK, &page, 1).await;

    assert!(connector.login(None).await.success());
    assert_eq!(connector.csrf_token(), Some("tok987zz"));
}

#[tokio::test]
async fn test_login_without_credentials_sends_nothing() {
    let (server, mut connector) = setup(None).await;

    let response = connector.login(None).await;
    assert_eq!(response.trace(), trace::LOGIN_NO_CREDENTIALS);
    assert_eq!(response.error_kind(), Some(ErrorKind::LoginError));

    let response = connector.send_request(&heartbeat(&connector)).await;
    assert!(!response.success());
    assert_eq!(response.trace(), trace::SEND_AUTH_FAILED);

    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Requests ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_request_logs_in_exactly_once() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=1322"))
        .and(header("X-Csrf-Token", TOKEN))
        .and(header("Cookie", "JSESSIONID=sess42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let first = connector.send_request(&heartbeat(&connector)).await;
    let second = connector.send_request(&heartbeat(&connector)).await;

    for response in [&first, &second] {
        assert!(response.success(), "request failed: {:?}", response.error());
        assert_eq!(response.trace(), trace::SEND_OK);
        assert_eq!(
            response.data(),
            Some(&ResponseData::Json(json!({"status": "ok"})))
        );
    }
}

#[tokio::test]
async fn test_post_body_is_newline_joined() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=1322\n__RequestType=ajax\nt="))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&server)
        .await;

    let response = connector.send_request(&heartbeat(&connector)).await;
    assert!(response.success());
    assert_eq!(response.text(), Some("done"));
    assert_eq!(response.data(), None);
}

#[tokio::test]
async fn test_http_error_status_is_unsuccessful() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    Mock::given(method("POST"))
        .and(body_string_contains("mode=1322"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Error"))
        .mount(&server)
        .await;

    let response = connector.send_request(&heartbeat(&connector)).await;
    assert!(!response.success());
    assert_eq!(response.status_code(), Some(500));
    assert_eq!(response.trace(), trace::SEND_HTTP_STATUS);
    assert!(response.error().is_none());
}

#[tokio::test]
async fn test_expired_session_cookie_is_dropped() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=1322"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "JSESSIONID=; Path=/; Max-Age=0")
                .set_body_string("bye"),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert!(connector.login(None).await.success());
    assert!(connector.cookie_header().is_some());

    let response = connector.send_request(&heartbeat(&connector)).await;
    assert!(response.success());
    assert_eq!(connector.cookie_header(), None);
}

#[tokio::test]
async fn test_get_info_caches_after_login() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    let first = connector.get_info().await;
    assert_eq!(first.trace(), trace::INFO_AFTER_LOGIN);
    let second = connector.get_info().await;
    assert_eq!(second.trace(), trace::INFO_CACHED);
    assert_eq!(first.device_info(), second.device_info());
}

#[tokio::test]
async fn test_resume_session_sends_seeded_cookie() {
    let (server, mut connector) = setup(admin()).await;

    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(header("Cookie", "JSESSIONID=captcha-session"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AUTH_OK))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/webconsole/webpages/index.jsp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(&server)
        .await;

    connector.resume_session([("JSESSIONID", "captcha-session")]);
    let response = connector
        .login(Some(Credentials::new("admin", "s3cret").with_captcha("x7k2")))
        .await;
    assert!(response.success(), "login failed: {:?}", response.error());
}

// ── Transport failures ──────────────────────────────────────────────

#[tokio::test]
async fn test_refused_connection_maps_to_agent_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut connector = Connector::new(
        Address::new("127.0.0.1")
            .with_port(port)
            .with_scheme(Scheme::Http),
        admin(),
    );
    let request = heartbeat(&connector);
    let response = connector.send_request(&request).await;

    assert!(!response.success());
    assert_eq!(response.trace(), trace::SEND_AUTH_FAILED);
    assert_eq!(response.error_kind(), Some(ErrorKind::AgentConnectionError));
    assert_eq!(response.target(), format!("127.0.0.1:{port}"));
}

#[tokio::test]
async fn test_stalled_reply_maps_to_read_timeout() {
    let server = MockServer::start().await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;
    Mock::given(method("POST"))
        .and(path("/webconsole/Controller"))
        .and(body_string_contains("mode=1322"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut connector = Connector::new(
        address_for(&server).with_timeout(Duration::from_millis(500)),
        admin(),
    );
    let request = heartbeat(&connector);
    let response = connector.send_request(&request).await;

    assert!(!response.success());
    assert_eq!(response.trace(), trace::SEND_TRANSPORT_ERROR);
    assert_eq!(response.error_kind(), Some(ErrorKind::ReadTimeoutError));
}

#[tokio::test]
async fn test_unknown_host_maps_to_name_resolution_error() {
    let mut connector = Connector::new(
        Address::new("sfos-unreachable.invalid").with_scheme(Scheme::Http),
        admin(),
    );
    let response = connector.login(None).await;

    assert!(!response.success());
    assert_eq!(response.trace(), trace::LOGIN_TRANSPORT_ERROR);
    assert_eq!(response.error_kind(), Some(ErrorKind::NameResolutionError));
}

// ── Downloads ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_download_streams_to_file() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    let backup = vec![0x42_u8; 256 * 1024];
    Mock::given(method("GET"))
        .and(path("/webconsole/Controller"))
        .and(query_param("mode", "466"))
        .and(header("X-Csrf-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(backup.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("backups").join("fw1.bak");
    let set = connector.templates().load("DOWNLOAD_BACKUP").unwrap();
    let request = request::build(&set.definitions()[0], connector.address(), None);

    let response = connector.download(&request, &dest).await;

    assert!(response.success(), "download failed: {:?}", response.error());
    assert_eq!(response.trace(), trace::DOWNLOAD_OK);
    assert_eq!(
        response.data(),
        Some(&ResponseData::Saved {
            path: dest.clone(),
            bytes: 256 * 1024,
        })
    );
    assert_eq!(std::fs::read(&dest).unwrap(), backup);
}

#[tokio::test]
async fn test_download_error_status_saves_nothing() {
    let (server, mut connector) = setup(admin()).await;
    mount_login(&server, AUTH_OK, LANDING_PAGE, 1).await;

    Mock::given(method("GET"))
        .and(path("/webconsole/Controller"))
        .and(query_param("mode", "466"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string("<html>Internal Server Error</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("fw1.bak");
    let set = connector.templates().load("DOWNLOAD_BACKUP").unwrap();
    let request = request::build(&set.definitions()[0], connector.address(), None);

    let response = connector.download(&request, &dest).await;

    assert!(!response.success());
    assert_eq!(response.trace(), trace::DOWNLOAD_ERROR);
    assert_eq!(response.status_code(), Some(500));
    assert_eq!(response.error_kind(), Some(ErrorKind::HttpStatusError));
    assert!(!dest.exists());
}
