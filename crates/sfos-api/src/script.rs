// Script Engine: named commands run in order on one Connector.
//
// Every item is resolved (template, request object, variable substitution)
// before anything is sent, so a typo in the last item fails the script
// without touching the appliance. Once dispatch starts, failures are
// recorded in the returned responses and the remaining items still run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::connector::Connector;
use crate::error::Error;
use crate::request::build;
use crate::response::SfosResponse;
use crate::template::{DefinitionSet, TemplateRegistry};
use crate::transport::Transport;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern"));

/// Runtime variables substituted into `{name}` placeholders.
pub type Variables = BTreeMap<String, String>;

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptItem {
    pub command: String,
    #[serde(default, alias = "requestObject", skip_serializing_if = "Option::is_none")]
    pub request_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ScriptItem {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            request_object: None,
            data: None,
        }
    }

    pub fn with_request_object(mut self, name: impl Into<String>) -> Self {
        self.request_object = Some(name.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An ordered list of commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Script {
    pub commands: Vec<ScriptItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Bare(Vec<ScriptItem>),
    Wrapped { commands: Vec<ScriptItem> },
}

impl From<Vec<ScriptItem>> for Script {
    fn from(commands: Vec<ScriptItem>) -> Self {
        Self { commands }
    }
}

impl Script {
    /// Load a JSON or YAML (`.yaml`/`.yml`) script file.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Script {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let parsed: ScriptFile = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        }
        .map_err(|message| Error::Script {
            path: path.to_path_buf(),
            message,
        })?;

        let commands = match parsed {
            ScriptFile::Bare(commands) | ScriptFile::Wrapped { commands } => commands,
        };
        debug!(path = %path.display(), items = commands.len(), "loaded script");
        Ok(Self { commands })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ── Variable substitution ───────────────────────────────────────────

/// Replace `{name}` placeholders in string leaves, descending into nested
/// objects. Other values and unknown placeholders are left as they are.
pub fn substitute(value: &Value, variables: &Variables) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_str(text, variables)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(text: &str, variables: &Variables) -> String {
    if variables.is_empty() || !text.contains('{') {
        return text.to_owned();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps["name"]) {
            Some(value) => value.clone(),
            None => caps[0].to_owned(),
        })
        .into_owned()
}

/// `json=` field text for a payload: strings verbatim, anything else as
/// compact JSON.
fn payload_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// A script item with everything looked up.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub command: String,
    pub definitions: DefinitionSet,
    pub payload: Option<String>,
}

/// Runs scripts against a Connector.
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    variables: Variables,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: Variables) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Resolve every item against `templates`, failing on the first one
    /// that names an unknown command or request object.
    pub fn resolve(
        &self,
        templates: &TemplateRegistry,
        script: &Script,
    ) -> Result<Vec<ResolvedItem>, Error> {
        script
            .commands
            .iter()
            .map(|item| {
                let mut definitions = templates.load(&item.command)?;
                if let Some(name) = &item.request_object {
                    let object = templates.load_request_object(&item.command, name)?;
                    definitions =
                        definitions.with_request_object(&substitute(&object, &self.variables));
                }
                let payload = item
                    .data
                    .as_ref()
                    .map(|data| substitute(data, &self.variables))
                    .as_ref()
                    .and_then(payload_text);
                Ok(ResolvedItem {
                    command: item.command.clone(),
                    definitions,
                    payload,
                })
            })
            .collect()
    }

    /// Run `script` on `connector`, one response per dispatched request.
    ///
    /// Returns `Err` only when the script cannot be resolved; dispatch
    /// failures are reported in the responses.
    pub async fn execute<T: Transport>(
        &self,
        connector: &mut Connector<T>,
        script: &Script,
    ) -> Result<Vec<SfosResponse>, Error> {
        let resolved = self.resolve(connector.templates(), script)?;
        let mut responses = Vec::with_capacity(resolved.len());

        for item in &resolved {
            for definition in item.definitions.definitions() {
                let request = build(definition, connector.address(), item.payload.as_deref());
                let response = connector.send_request(&request).await;
                debug!(
                    host = %connector.address(),
                    command = %item.command,
                    success = response.success(),
                    trace = response.trace(),
                    "script step complete"
                );
                responses.push(response);
            }
        }

        let failed = responses.iter().filter(|r| !r.success()).count();
        info!(
            host = %connector.address(),
            steps = responses.len(),
            failed,
            "script finished"
        );
        Ok(responses)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn substitutes_string_leaves_only() {
        let payload = json!({
            "msg": "hello {name}",
            "count": 3,
            "nested": {"greeting": "hi {name}, {unknown}"},
            "list": ["{name}"]
        });
        let out = substitute(&payload, &vars(&[("name", "bob")]));
        assert_eq!(
            out,
            json!({
                "msg": "hello bob",
                "count": 3,
                "nested": {"greeting": "hi bob, {unknown}"},
                "list": ["{name}"]
            })
        );
    }

    #[test]
    fn no_variables_is_identity() {
        let payload = json!({"msg": "hello {name}"});
        assert_eq!(substitute(&payload, &Variables::new()), payload);
    }

    #[test]
    fn resolve_fails_fast_on_unknown_command() {
        let script = Script::from(vec![
            ScriptItem::new("HEARTBEAT_STATUS"),
            ScriptItem::new("NOT_A_COMMAND"),
        ]);
        let err = ScriptEngine::new()
            .resolve(&TemplateRegistry::builtin(), &script)
            .unwrap_err();
        assert!(matches!(err, Error::DefinitionNotFound { ref name, .. } if name == "NOT_A_COMMAND"));
    }

    #[test]
    fn resolve_serialises_payloads() {
        let script = Script::from(vec![
            ScriptItem::new("HEARTBEAT_STATUS").with_data(json!({"who": "{name}"})),
            ScriptItem::new("SERVICE_STATUS").with_data(json!("raw text")),
        ]);
        let resolved = ScriptEngine::with_variables(vars(&[("name", "bob")]))
            .resolve(&TemplateRegistry::builtin(), &script)
            .unwrap();
        assert_eq!(resolved[0].payload.as_deref(), Some(r#"{"who":"bob"}"#));
        assert_eq!(resolved[1].payload.as_deref(), Some("raw text"));
    }

    #[test]
    fn loads_bare_and_wrapped_files() {
        let dir = tempfile::tempdir().unwrap();

        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, r#"[{"command": "HEARTBEAT_STATUS"}]"#).unwrap();
        assert_eq!(Script::from_path(&bare).unwrap().len(), 1);

        let wrapped = dir.path().join("wrapped.yaml");
        std::fs::write(
            &wrapped,
            "commands:\n  - command: SERVICE_STATUS\n    request_object: all\n  - command: GET_HA_TYPE\n",
        )
        .unwrap();
        let script = Script::from_path(&wrapped).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.commands[0].request_object.as_deref(), Some("all"));
    }

    #[test]
    fn unreadable_script_is_a_script_error() {
        let err = Script::from_path(Path::new("/nonexistent/script.json")).unwrap_err();
        assert!(matches!(err, Error::Script { .. }));
    }
}
