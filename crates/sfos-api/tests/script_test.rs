#![allow(clippy::unwrap_used)]
// Script engine tests over a scripted in-memory transport.

use std::path::Path;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use sfos_api::transport::{Jar, RawResponse, SavedResponse, TransportError, TransportErrorKind};
use sfos_api::{
    Address, BuiltRequest, Connector, Credentials, Error, ErrorKind, Script,
    ScriptEngine, ScriptItem, TemplateRegistry, Transport, Variables,
};

const LANDING_PAGE: &str = include_str!("fixtures/index.jsp.html");
const AUTH_OK: &str = r#"{"redirectionURL":"/webpages/index.jsp","status":200}"#;

// ── Fake appliance ──────────────────────────────────────────────────

/// Answers the login handshake, succeeds on everything else, and fails
/// with a connection error on any request whose body contains `fail_on`.
#[derive(Default)]
struct FakeAppliance {
    fail_on: Option<&'static str>,
    sent: Mutex<Vec<BuiltRequest>>,
}

impl FakeAppliance {
    fn failing_on(marker: &'static str) -> Self {
        Self {
            fail_on: Some(marker),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<BuiltRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for FakeAppliance {
    async fn send(
        &self,
        request: &BuiltRequest,
        _jar: &Jar,
    ) -> Result<RawResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let body = request.body.clone().unwrap_or_default();

        if let Some(marker) = self.fail_on {
            if body.contains(marker) {
                return Err(TransportError::new(
                    TransportErrorKind::Connection,
                    "connection reset by peer",
                ));
            }
        }

        let text = if request.url.ends_with("index.jsp") {
            LANDING_PAGE.to_owned()
        } else if body.starts_with("mode=151") {
            AUTH_OK.to_owned()
        } else {
            json!({"status": 200, "echo": body}).to_string()
        };
        Ok(RawResponse { status: 200, text })
    }

    async fn download(
        &self,
        _request: &BuiltRequest,
        _jar: &Jar,
        dest: &Path,
    ) -> Result<SavedResponse, TransportError> {
        Ok(SavedResponse {
            status: 200,
            path: dest.to_path_buf(),
            bytes: 0,
        })
    }
}

fn connector(transport: Arc<FakeAppliance>, templates: TemplateRegistry) -> Connector<FakeAppliance> {
    Connector::with_transport(
        Address::new("fw1"),
        Some(Credentials::new("admin", "s3cret")),
        transport,
        Arc::new(templates),
    )
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_item_failure_does_not_stop_script() {
    let transport = Arc::new(FakeAppliance::failing_on("mode=1329"));
    let mut fw = connector(Arc::clone(&transport), TemplateRegistry::builtin());
    let script = Script::from(vec![
        ScriptItem::new("HEARTBEAT_STATUS"),
        ScriptItem::new("SERVICE_STATUS"),
    ]);

    let responses = ScriptEngine::new().execute(&mut fw, &script).await.unwrap();

    assert_eq!(responses.len(), 2);
    assert!(responses[0].success());
    assert!(!responses[1].success());
    assert_eq!(
        responses[1].error_kind(),
        Some(ErrorKind::AgentConnectionError)
    );
    assert_eq!(responses[1].target(), "fw1:4444");
}

#[tokio::test]
async fn test_script_runs_on_one_session() {
    let transport = Arc::new(FakeAppliance::default());
    let mut fw = connector(Arc::clone(&transport), TemplateRegistry::builtin());
    let script = Script::from(vec![
        ScriptItem::new("HEARTBEAT_STATUS"),
        ScriptItem::new("GET_HA_TYPE"),
        ScriptItem::new("SERVICE_STATUS"),
    ]);

    let responses = ScriptEngine::new().execute(&mut fw, &script).await.unwrap();
    assert!(responses.iter().all(sfos_api::SfosResponse::success));

    let sent = transport.sent();
    // login pair, then the three commands in order
    assert_eq!(sent.len(), 5);
    let modes: Vec<&str> = sent[2..]
        .iter()
        .map(|r| r.body.as_deref().unwrap().split('\n').next().unwrap())
        .collect();
    assert_eq!(modes, ["mode=1322", "mode=1284", "mode=1329"]);
    for request in &sent[2..] {
        assert_eq!(request.header("X-Csrf-Token"), Some("tok123abc"));
    }
}

#[tokio::test]
async fn test_variables_reach_the_wire() {
    let transport = Arc::new(FakeAppliance::default());
    let mut fw = connector(Arc::clone(&transport), TemplateRegistry::builtin());
    let script = Script::from(vec![
        ScriptItem::new("HEARTBEAT_STATUS").with_data(json!({"msg": "hello {name}", "n": 1})),
    ]);
    let variables: Variables = [("name".to_owned(), "bob".to_owned())].into();

    let responses = ScriptEngine::with_variables(variables)
        .execute(&mut fw, &script)
        .await
        .unwrap();

    assert!(responses[0].success());
    let body = transport.sent().last().unwrap().body.clone().unwrap();
    assert!(body.contains(r#"json={"msg":"hello bob","n":1}"#), "body was {body}");
}

#[tokio::test]
async fn test_unresolvable_script_sends_nothing() {
    let transport = Arc::new(FakeAppliance::default());
    let mut fw = connector(Arc::clone(&transport), TemplateRegistry::builtin());
    let script = Script::from(vec![
        ScriptItem::new("HEARTBEAT_STATUS"),
        ScriptItem::new("HEARTBEAT_STATUS").with_request_object("missing"),
    ]);

    let err = ScriptEngine::new().execute(&mut fw, &script).await.unwrap_err();

    assert!(matches!(err, Error::NoMatchFound { .. }));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_request_object_from_template_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("READ_RECORD.json"),
        json!({
            "req_mode": 300,
            "web_method": "post",
            "req_objects": {"interfaces": {"entity": "{entity}", "page": 1}}
        })
        .to_string(),
    )
    .unwrap();

    let transport = Arc::new(FakeAppliance::default());
    let mut fw = connector(
        Arc::clone(&transport),
        TemplateRegistry::with_search_paths([dir.path().to_path_buf()]),
    );
    let script = Script::from(vec![
        ScriptItem::new("READ_RECORD").with_request_object("interfaces"),
    ]);
    let variables: Variables = [("entity".to_owned(), "port".to_owned())].into();

    let responses = ScriptEngine::with_variables(variables)
        .execute(&mut fw, &script)
        .await
        .unwrap();

    assert!(responses[0].success());
    let body = transport.sent().last().unwrap().body.clone().unwrap();
    assert!(
        body.starts_with("mode=300\nrequestObj={\"entity\":\"port\",\"page\":1}\n__RequestType=ajax"),
        "body was {body}"
    );
}
